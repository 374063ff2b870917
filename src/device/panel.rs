//! GHS panel adapter.
//!
//! High-level interface for the DRS1000 gas handling panel: ADC channels,
//! key/indicator states, system status and identification.

use std::io::Write;
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::device::link::{SerialSettings, Transport, read_line};
use crate::error::{GhsError, Result};
use crate::protocol::{
    ADC_CHANNELS, Command, KeyStatusMap, PanelReply, RawReply, SystemStatus, calibrate,
    encode_request,
};

// =============================================================================
// PanelDevice
// =============================================================================

/// What the acquisition loop needs from a panel.
pub trait PanelDevice: Send {
    /// Calibrated ADC values with the device's error code.
    fn get_adc(&mut self) -> Result<PanelReply<Vec<i64>>>;

    /// Key status map with the device's error code.
    fn get_keys(&mut self) -> Result<PanelReply<KeyStatusMap>>;

    /// Close the link. Safe to call more than once.
    fn disconnect(&mut self);
}

// =============================================================================
// GhsPanel
// =============================================================================

/// GHS panel handle.
///
/// Owns its link exclusively; the link is closed on `disconnect()` or when
/// the handle is dropped, whichever comes first.
///
/// # Example
///
/// ```no_run
/// use ghs_monitor::device::GhsPanel;
///
/// let mut panel = GhsPanel::connect("/dev/ttyUSB0")?;
/// let adc = panel.get_adc()?;
/// println!("code={} values={:?}", adc.code, adc.values);
/// panel.disconnect();
/// # Ok::<(), ghs_monitor::error::GhsError>(())
/// ```
pub struct GhsPanel<T: Transport = Box<dyn SerialPort>> {
    link: Option<T>,
    port: String,
    read_timeout: Duration,
}

impl GhsPanel {
    /// Open the panel on `port` at 9600-8-N-1 with a 1 s read timeout.
    ///
    /// # Errors
    /// Returns `Connect` if the port cannot be opened.
    pub fn connect(port: &str) -> Result<Self> {
        Self::connect_with(&SerialSettings::new(port))
    }

    pub fn connect_with(settings: &SerialSettings) -> Result<Self> {
        let link = settings.open()?;
        Ok(Self::with_transport(
            link,
            settings.port.clone(),
            settings.read_timeout,
        ))
    }
}

impl<T: Transport> GhsPanel<T> {
    /// Wrap an already open transport.
    pub fn with_transport(link: T, port: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            link: Some(link),
            port: port.into(),
            read_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Send one request line and split the reply into code and tokens.
    ///
    /// Pending input is discarded first so a late reply to an earlier
    /// request cannot be taken for this one.
    pub fn query(&mut self, command: &str) -> Result<RawReply> {
        let timeout = self.read_timeout;
        let link = self.link.as_mut().ok_or(GhsError::NotConnected)?;

        link.clear_input()?;

        link.write_all(&encode_request(command))?;
        link.flush()?;

        let line = read_line(link, timeout, command)?;
        debug!(port = %self.port, command, reply = %line.escape_debug(), "Panel exchange");

        RawReply::parse(&line)
    }

    /// Send `command` and parse the reply as `<code>\t<int>,<int>,...`.
    ///
    /// A non-zero code is returned as part of the reply, not as an error.
    ///
    /// # Errors
    /// `Timeout` or `MalformedResponse` when the reply cannot be read or
    /// parsed; `Io` on link failure.
    pub fn send(&mut self, command: &str) -> Result<PanelReply<Vec<i64>>> {
        let reply = self.query(command)?;
        let values = reply.integers()?;
        Ok(PanelReply {
            code: reply.code,
            values,
        })
    }

    /// Query `ADC?` and apply the calibration offsets.
    ///
    /// # Errors
    /// `MalformedResponse` if the panel reports success with a value count
    /// other than eight.
    pub fn get_adc(&mut self) -> Result<PanelReply<Vec<i64>>> {
        let reply = self.send(Command::Adc.as_str())?;

        if reply.is_ok() && reply.values.len() != ADC_CHANNELS {
            return Err(GhsError::malformed(format!(
                "ADC reply has {} values, expected {}",
                reply.values.len(),
                ADC_CHANNELS
            )));
        }

        Ok(reply.map(|raw| calibrate(&raw)))
    }

    /// Query `KEYS?`; values map to their position.
    pub fn get_keys(&mut self) -> Result<PanelReply<KeyStatusMap>> {
        let reply = self.send(Command::Keys.as_str())?;
        Ok(reply.map(|values| KeyStatusMap::from_values(&values)))
    }

    /// Query `STATUS?` and decode the first value through the status table.
    pub fn check_status(&mut self) -> Result<PanelReply<Option<SystemStatus>>> {
        let reply = self.send(Command::Status.as_str())?;
        Ok(reply.map(|values| values.first().map(|&code| SystemStatus::from_code(code))))
    }

    /// Query `ID?`; the identification tokens are returned verbatim.
    pub fn identify(&mut self) -> Result<PanelReply<String>> {
        self.identify_with(Command::Id)
    }

    /// Query `ID2?`.
    pub fn identify2(&mut self) -> Result<PanelReply<String>> {
        self.identify_with(Command::Id2)
    }

    fn identify_with(&mut self, command: Command) -> Result<PanelReply<String>> {
        let reply = self.query(command.as_str())?;
        Ok(PanelReply {
            code: reply.code,
            values: reply.tokens.join(","),
        })
    }

    /// Close the link if open.
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            debug!(port = %self.port, "Panel link closed");
        }
    }
}

impl<T: Transport> PanelDevice for GhsPanel<T> {
    fn get_adc(&mut self) -> Result<PanelReply<Vec<i64>>> {
        GhsPanel::get_adc(self)
    }

    fn get_keys(&mut self) -> Result<PanelReply<KeyStatusMap>> {
        GhsPanel::get_keys(self)
    }

    fn disconnect(&mut self) {
        GhsPanel::disconnect(self)
    }
}

impl<T: Transport> Drop for GhsPanel<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
