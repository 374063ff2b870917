//! Reply parsing for the GHS panel.
//!
//! Turns a reply line into an error code plus value list, applies the ADC
//! calibration and builds the key status map.

use std::collections::BTreeMap;

use crate::error::{GhsError, Result};
use crate::protocol::commands::{
    ADC_CHANNELS, CALIBRATION_OFFSETS, CARRIAGE_RETURN, FIELD_SEPARATOR, PanelErrorCode,
    VALUE_SEPARATOR,
};

// =============================================================================
// Reply Line
// =============================================================================

/// Reply line split into its error code and raw value tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub code: PanelErrorCode,
    pub tokens: Vec<String>,
}

impl RawReply {
    /// Parse `<errorCode>\t<v1>,<v2>,...` (terminator already removed).
    ///
    /// An empty value section yields no tokens.
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the tab separator is missing or the
    /// error code is not an integer.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(CARRIAGE_RETURN as char);
        let (code, values) = line.split_once(FIELD_SEPARATOR).ok_or_else(|| {
            GhsError::malformed(format!("Missing tab separator in reply {:?}", line))
        })?;

        let code: i64 = code.trim().parse().map_err(|_| {
            GhsError::malformed(format!("Error code {:?} is not an integer", code))
        })?;

        let tokens = if values.trim().is_empty() {
            Vec::new()
        } else {
            values
                .split(VALUE_SEPARATOR)
                .map(|t| t.trim().to_string())
                .collect()
        };

        Ok(RawReply {
            code: PanelErrorCode::from_code(code),
            tokens,
        })
    }

    /// Interpret every token as an integer.
    ///
    /// # Errors
    /// Returns `MalformedResponse` naming the first token that is not one.
    pub fn integers(&self) -> Result<Vec<i64>> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                t.parse::<i64>().map_err(|_| {
                    GhsError::malformed(format!("Value #{} ({:?}) is not an integer", i, t))
                })
            })
            .collect()
    }
}

/// Decoded reply: the device's error code and the payload it came with.
///
/// A non-zero code is kept here as data; deciding whether it is a failure
/// is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelReply<T> {
    pub code: PanelErrorCode,
    pub values: T,
}

impl<T> PanelReply<T> {
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PanelReply<U> {
        PanelReply {
            code: self.code,
            values: f(self.values),
        }
    }
}

// =============================================================================
// ADC
// =============================================================================

/// Apply the calibration multipliers index-wise, truncating toward zero.
///
/// Values beyond the calibration table are dropped.
pub fn calibrate(raw: &[i64]) -> Vec<i64> {
    raw.iter()
        .zip(CALIBRATION_OFFSETS.iter())
        .map(|(&value, &offset)| (value as f64 * offset).trunc() as i64)
        .collect()
}

/// One calibrated sample of the eight on-board ADC channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelReading {
    pub channels: [i64; ADC_CHANNELS],
}

impl PanelReading {
    pub fn get(&self, channel: usize) -> Option<i64> {
        self.channels.get(channel).copied()
    }
}

impl TryFrom<Vec<i64>> for PanelReading {
    type Error = GhsError;

    fn try_from(values: Vec<i64>) -> Result<Self> {
        let count = values.len();
        let channels: [i64; ADC_CHANNELS] = values.try_into().map_err(|_| {
            GhsError::malformed(format!(
                "ADC reply has {} values, expected {}",
                count, ADC_CHANNELS
            ))
        })?;
        Ok(PanelReading { channels })
    }
}

impl std::fmt::Display for PanelReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, value) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            write!(f, "P{}={:>5}", i + 1, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Tri-state code of a key or indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyState {
    /// 0, or any code outside the table.
    #[default]
    Unknown,
    /// 1
    Deasserted,
    /// 2
    Asserted,
}

impl KeyState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => KeyState::Deasserted,
            2 => KeyState::Asserted,
            _ => KeyState::Unknown,
        }
    }

    pub const fn code(&self) -> u8 {
        match self {
            KeyState::Unknown => 0,
            KeyState::Deasserted => 1,
            KeyState::Asserted => 2,
        }
    }
}

/// Index → state of the panel keys and indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStatusMap {
    states: BTreeMap<usize, KeyState>,
}

impl KeyStatusMap {
    /// Map positional reply values to their index.
    pub fn from_values(values: &[i64]) -> Self {
        let states = values
            .iter()
            .enumerate()
            .map(|(index, &code)| (index, KeyState::from_code(code)))
            .collect();
        KeyStatusMap { states }
    }

    /// State at `index`, `None` if the panel did not report it.
    pub fn get(&self, index: usize) -> Option<KeyState> {
        self.states.get(&index).copied()
    }

    pub fn is_asserted(&self, index: usize) -> bool {
        self.get(index) == Some(KeyState::Asserted)
    }

    pub fn insert(&mut self, index: usize, state: KeyState) {
        self.states.insert(index, state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, KeyState)> + '_ {
        self.states.iter().map(|(&i, &s)| (i, s))
    }
}
