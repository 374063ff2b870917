//! Custom error types for the gas handling panel and gauge links.
//!
//! Errors fall into three families: the link could not be opened
//! (`Connect`), the exchange failed at the transport or framing level
//! (`Timeout`, `MalformedResponse`, `Io`), or the device answered with a
//! non-zero error code of its own (`DeviceReported`).

use thiserror::Error;

use crate::protocol::PanelErrorCode;

/// Main error type for panel, gauge and acquisition operations.
#[derive(Error, Debug)]
pub enum GhsError {
    /// Serial port could not be opened.
    #[error("Cannot open serial port '{port}': {source}")]
    Connect {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// No terminated line arrived within the link's read timeout.
    #[error("Timeout waiting for reply to '{command}'")]
    Timeout { command: String },

    /// Reply line did not follow the expected format.
    #[error("Malformed response from device: {message}")]
    MalformedResponse { message: String },

    /// Low-level I/O failure on an open link.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device understood the request and answered with an error code.
    #[error("Device reported '{code}' (code {}) for '{command}'", .code.code())]
    DeviceReported {
        command: String,
        code: PanelErrorCode,
    },

    /// Link was already closed.
    #[error("Device not connected")]
    NotConnected,

    /// Generic invalid input error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration value out of range or unreadable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start()` called while a worker is still alive.
    #[error("Acquisition already running")]
    AlreadyRunning,

    /// The acquisition worker thread panicked.
    #[error("Acquisition worker panicked")]
    WorkerPanicked,
}

impl GhsError {
    /// True for transport/framing failures (timeout, malformed line, I/O).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            GhsError::Timeout { .. } | GhsError::MalformedResponse { .. } | GhsError::Io(_)
        )
    }

    /// Error code reported by the device, if this is a device-level error.
    pub fn reported_code(&self) -> Option<PanelErrorCode> {
        match self {
            GhsError::DeviceReported { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        GhsError::MalformedResponse {
            message: message.into(),
        }
    }
}

/// Result type alias for panel and acquisition operations.
pub type Result<T> = std::result::Result<T, GhsError>;
