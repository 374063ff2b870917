//! Serial link settings and the byte transport both devices talk over.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{GhsError, Result};
use crate::protocol::{CARRIAGE_RETURN, LINE_TERMINATOR};

// =============================================================================
// Constants
// =============================================================================

/// Baud rate shared by the panel and the gauge controller.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout for one reply line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest reply line accepted before giving up on a terminator.
const MAX_LINE_LENGTH: usize = 4096;

// =============================================================================
// Settings
// =============================================================================

/// Endpoint and framing of a serial link (8 data bits, no parity, 1 stop bit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Open the port with the fixed 8-N-1 framing.
    ///
    /// # Errors
    /// Returns `Connect` if the port cannot be opened.
    pub fn open(&self) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.read_timeout)
            .open()
            .map_err(|source| GhsError::Connect {
                port: self.port.clone(),
                source,
            })?;

        debug!(port = %self.port, baud = self.baud_rate, "Serial port opened");
        Ok(port)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Byte stream a device adapter owns.
///
/// Implemented for real serial ports; tests plug in scripted streams.
pub trait Transport: Read + Write + Send {
    /// Discard anything already received but not yet read.
    fn clear_input(&mut self) -> std::io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(std::io::Error::from)
    }
}

/// Read one line up to the line feed, bounded by `timeout`.
///
/// The terminator and a trailing carriage return are stripped.
///
/// # Errors
/// * `Timeout` if nothing arrived before the deadline.
/// * `MalformedResponse` if the line stopped without a terminator, was not
///   UTF-8, or grew past the length limit.
pub fn read_line<T: Read + ?Sized>(link: &mut T, timeout: Duration, command: &str) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match link.read(&mut byte) {
            Ok(1) => {
                if byte[0] == LINE_TERMINATOR {
                    break;
                }
                line.push(byte[0]);
                if line.len() > MAX_LINE_LENGTH {
                    return Err(GhsError::malformed(format!(
                        "Reply to '{}' exceeds {} bytes without terminator",
                        command, MAX_LINE_LENGTH
                    )));
                }
                if Instant::now() >= deadline {
                    return unterminated(line, command);
                }
            }
            Ok(_) => return unterminated(line, command),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return unterminated(line, command);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(GhsError::Io(e)),
        }
    }

    if line.last() == Some(&CARRIAGE_RETURN) {
        line.pop();
    }

    String::from_utf8(line)
        .map_err(|_| GhsError::malformed(format!("Reply to '{}' is not valid UTF-8", command)))
}

fn unterminated(line: Vec<u8>, command: &str) -> Result<String> {
    if line.is_empty() {
        Err(GhsError::Timeout {
            command: command.to_string(),
        })
    } else {
        Err(GhsError::malformed(format!(
            "Unterminated reply to '{}': {:?}",
            command,
            String::from_utf8_lossy(&line)
        )))
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted transport: every write pops the next canned reply into the
    /// read buffer. Written bytes are recorded for inspection.
    #[derive(Clone, Default)]
    pub struct ScriptedLink {
        pub written: Arc<Mutex<Vec<u8>>>,
        replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pending: Arc<Mutex<VecDeque<u8>>>,
    }

    impl ScriptedLink {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<[u8]>,
        {
            Self {
                replies: Arc::new(Mutex::new(
                    replies.into_iter().map(|r| r.as_ref().to_vec()).collect(),
                )),
                ..Default::default()
            }
        }

        /// Queue bytes as if they had arrived unsolicited.
        pub fn inject_stale(&self, bytes: &[u8]) {
            self.pending.lock().unwrap().extend(bytes);
        }

        pub fn written_text(&self) -> String {
            String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
        }
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = pending.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                self.pending.lock().unwrap().extend(reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for ScriptedLink {
        fn clear_input(&mut self) -> std::io::Result<()> {
            self.pending.lock().unwrap().clear();
            Ok(())
        }
    }
}
