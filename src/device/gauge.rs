//! Vacuum gauge controller client.
//!
//! The acquisition loop only depends on [`PressureGauge`]. [`MaxiGauge`] is
//! the serial client for the six-channel controller on the cryostat rack:
//! each channel is read with a `PR<n>` request, an ACK/NAK line, an ENQ
//! byte, and a `<status>,<value>` data line.

use std::io::Write;
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use crate::device::link::{SerialSettings, Transport, read_line};
use crate::error::{GhsError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Number of gauge channels on the controller.
pub const GAUGE_CHANNELS: u8 = 6;

/// Positive acknowledge.
const ACK: u8 = 0x06;
/// Negative acknowledge.
const NAK: u8 = 0x15;
/// Enquiry, requests transmission of the prepared reply.
const ENQ: u8 = 0x05;

// =============================================================================
// Readings
// =============================================================================

/// Sensor status reported alongside each pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Ok,
    Underrange,
    Overrange,
    SensorError,
    SensorOff,
    NoSensor,
    IdentificationError,
    Unknown(u8),
}

impl SensorStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SensorStatus::Ok,
            1 => SensorStatus::Underrange,
            2 => SensorStatus::Overrange,
            3 => SensorStatus::SensorError,
            4 => SensorStatus::SensorOff,
            5 => SensorStatus::NoSensor,
            6 => SensorStatus::IdentificationError,
            other => SensorStatus::Unknown(other),
        }
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::Ok => write!(f, "Measurement data okay"),
            SensorStatus::Underrange => write!(f, "Underrange"),
            SensorStatus::Overrange => write!(f, "Overrange"),
            SensorStatus::SensorError => write!(f, "Sensor error"),
            SensorStatus::SensorOff => write!(f, "Sensor off"),
            SensorStatus::NoSensor => write!(f, "No sensor"),
            SensorStatus::IdentificationError => write!(f, "Identification error"),
            SensorStatus::Unknown(code) => write!(f, "Unknown status {}", code),
        }
    }
}

/// One channel of a pressure read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeReading {
    pub channel: u8,
    pub status: SensorStatus,
    /// Pressure in the controller's configured unit.
    pub pressure: f64,
}

impl GaugeReading {
    /// Parse a `<status>,<value>` data line.
    pub fn parse(channel: u8, line: &str) -> Result<Self> {
        let (status, value) = line.trim().split_once(',').ok_or_else(|| {
            GhsError::malformed(format!("Gauge channel {} reply {:?} has no comma", channel, line))
        })?;

        let status: u8 = status.trim().parse().map_err(|_| {
            GhsError::malformed(format!("Gauge status {:?} is not an integer", status))
        })?;
        let pressure: f64 = value.trim().parse().map_err(|_| {
            GhsError::malformed(format!("Gauge value {:?} is not a number", value))
        })?;

        Ok(GaugeReading {
            channel,
            status: SensorStatus::from_code(status),
            pressure,
        })
    }
}

// =============================================================================
// PressureGauge
// =============================================================================

/// What the acquisition loop needs from the gauge controller.
pub trait PressureGauge: Send {
    /// One reading per channel, in channel order.
    fn pressures(&mut self) -> Result<Vec<GaugeReading>>;

    /// Close the link. Safe to call more than once.
    fn disconnect(&mut self);
}

// =============================================================================
// MaxiGauge
// =============================================================================

/// Six-channel gauge controller on a serial link.
pub struct MaxiGauge<T: Transport = Box<dyn SerialPort>> {
    link: Option<T>,
    port: String,
    read_timeout: Duration,
}

impl MaxiGauge {
    /// Open the controller on `port` at 9600-8-N-1.
    pub fn connect(port: &str) -> Result<Self> {
        let settings = SerialSettings::new(port);
        let link = settings.open()?;
        Ok(Self::with_transport(link, port, settings.read_timeout))
    }
}

impl<T: Transport> MaxiGauge<T> {
    pub fn with_transport(link: T, port: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            link: Some(link),
            port: port.into(),
            read_timeout,
        }
    }

    /// Read a single channel (1-based).
    pub fn pressure(&mut self, channel: u8) -> Result<GaugeReading> {
        if !(1..=GAUGE_CHANNELS).contains(&channel) {
            return Err(GhsError::InvalidInput(format!(
                "Gauge channel {} out of range 1-{}",
                channel, GAUGE_CHANNELS
            )));
        }

        let mnemonic = format!("PR{}", channel);
        let line = self.exchange(&mnemonic)?;
        GaugeReading::parse(channel, &line)
    }

    /// Send a mnemonic, check the acknowledge and fetch the data line.
    fn exchange(&mut self, mnemonic: &str) -> Result<String> {
        let timeout = self.read_timeout;
        let link = self.link.as_mut().ok_or(GhsError::NotConnected)?;

        link.clear_input()?;
        link.write_all(format!("{}\r\n", mnemonic).as_bytes())?;
        link.flush()?;

        let ack = read_line(link, timeout, mnemonic)?;
        match ack.as_bytes() {
            [ACK] => {}
            [NAK] => {
                return Err(GhsError::malformed(format!(
                    "Gauge rejected '{}' (NAK)",
                    mnemonic
                )));
            }
            other => {
                return Err(GhsError::malformed(format!(
                    "Expected ACK for '{}', got {:?}",
                    mnemonic,
                    String::from_utf8_lossy(other)
                )));
            }
        }

        link.write_all(&[ENQ])?;
        link.flush()?;
        let data = read_line(link, timeout, mnemonic)?;
        debug!(port = %self.port, mnemonic, reply = %data, "Gauge exchange");
        Ok(data)
    }

    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            debug!(port = %self.port, "Gauge link closed");
        }
    }
}

impl<T: Transport> PressureGauge for MaxiGauge<T> {
    fn pressures(&mut self) -> Result<Vec<GaugeReading>> {
        (1..=GAUGE_CHANNELS).map(|ch| self.pressure(ch)).collect()
    }

    fn disconnect(&mut self) {
        MaxiGauge::disconnect(self)
    }
}

impl<T: Transport> Drop for MaxiGauge<T> {
    fn drop(&mut self) {
        MaxiGauge::disconnect(self);
    }
}
