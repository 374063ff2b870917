//! Command set and code tables for the GHS panel line protocol.
//!
//! Requests are a single ASCII command followed by a line feed. Replies are
//! one line: `<errorCode>\t<v1>,<v2>,...,<vn>\n`.

// =============================================================================
// Constants
// =============================================================================

/// Line feed, terminates every request and reply.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Carriage return, tolerated (and stripped) at the end of a reply.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Separates the error code from the value list.
pub const FIELD_SEPARATOR: char = '\t';

/// Separates individual values.
pub const VALUE_SEPARATOR: char = ',';

/// Number of on-board ADC channels.
pub const ADC_CHANNELS: usize = 8;

/// Per-channel multipliers correcting raw ADC counts before truncation.
pub const CALIBRATION_OFFSETS: [f64; ADC_CHANNELS] = [
    0.6098, 0.6083, 0.61409, 1.0, 0.6073, 0.6081, 0.60849, 0.0468,
];

// =============================================================================
// Commands
// =============================================================================

/// Queries understood by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Panel identification.
    Id,
    /// Secondary identification.
    Id2,
    /// On-board ADC readings.
    Adc,
    /// Key/indicator states.
    Keys,
    /// System status.
    Status,
}

impl Command {
    /// Wire text without terminator.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::Id => "ID?",
            Command::Id2 => "ID2?",
            Command::Adc => "ADC?",
            Command::Keys => "KEYS?",
            Command::Status => "STATUS?",
        }
    }
}

/// Request bytes for `command`, terminator included.
pub fn encode_request(command: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(command.len() + 1);
    buf.extend_from_slice(command.as_bytes());
    buf.push(LINE_TERMINATOR);
    buf
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Error code leading every reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelErrorCode {
    NoError,
    Command,
    Syntax,
    Parameter,
    Communication,
    Execution,
    /// Code outside the documented table.
    Unknown(i64),
}

impl PanelErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => PanelErrorCode::NoError,
            1 => PanelErrorCode::Command,
            2 => PanelErrorCode::Syntax,
            3 => PanelErrorCode::Parameter,
            4 => PanelErrorCode::Communication,
            5 => PanelErrorCode::Execution,
            other => PanelErrorCode::Unknown(other),
        }
    }

    pub const fn code(&self) -> i64 {
        match self {
            PanelErrorCode::NoError => 0,
            PanelErrorCode::Command => 1,
            PanelErrorCode::Syntax => 2,
            PanelErrorCode::Parameter => 3,
            PanelErrorCode::Communication => 4,
            PanelErrorCode::Execution => 5,
            PanelErrorCode::Unknown(code) => *code,
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, PanelErrorCode::NoError)
    }

    pub const fn description(&self) -> &'static str {
        match self {
            PanelErrorCode::NoError => "No error",
            PanelErrorCode::Command => "Command error",
            PanelErrorCode::Syntax => "Syntax error",
            PanelErrorCode::Parameter => "Parameter error",
            PanelErrorCode::Communication => "Communication error",
            PanelErrorCode::Execution => "Execution error",
            PanelErrorCode::Unknown(_) => "Unknown error",
        }
    }
}

impl std::fmt::Display for PanelErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

// =============================================================================
// System Status
// =============================================================================

/// Operating mode reported by `STATUS?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Start,
    Helium3,
    Helium4,
    NormalCirculation,
    Recovery,
    Unknown(i64),
}

impl SystemStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SystemStatus::Start,
            2 => SystemStatus::Helium3,
            3 => SystemStatus::Helium4,
            4 => SystemStatus::NormalCirculation,
            5 => SystemStatus::Recovery,
            other => SystemStatus::Unknown(other),
        }
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemStatus::Start => write!(f, "Start"),
            SystemStatus::Helium3 => write!(f, "3He"),
            SystemStatus::Helium4 => write!(f, "4He"),
            SystemStatus::NormalCirculation => write!(f, "Normal circulation"),
            SystemStatus::Recovery => write!(f, "Recovery"),
            SystemStatus::Unknown(code) => write!(f, "Unknown ({})", code),
        }
    }
}
