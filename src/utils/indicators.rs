//! Named panel indicators and change tracking over key status maps.
//!
//! The panel reports keys positionally; this table gives the front-panel
//! name of each index the operator cares about. Unlisted indices are
//! reported by the panel but have no indicator.

use crate::protocol::{KeyState, KeyStatusMap};

// =============================================================================
// Indicator Table
// =============================================================================

/// What an indicator controls, which decides how changes are worded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    /// Valve or switch: "open" / "closed".
    Valve,
    /// Process or mode: "started" / "stopped".
    Process,
}

impl IndicatorKind {
    pub const fn on_word(&self) -> &'static str {
        match self {
            IndicatorKind::Valve => "open",
            IndicatorKind::Process => "started",
        }
    }

    pub const fn off_word(&self) -> &'static str {
        match self {
            IndicatorKind::Valve => "closed",
            IndicatorKind::Process => "stopped",
        }
    }
}

/// One front-panel indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub index: usize,
    pub name: &'static str,
    pub kind: IndicatorKind,
}

const fn valve(index: usize, name: &'static str) -> Indicator {
    Indicator {
        index,
        name,
        kind: IndicatorKind::Valve,
    }
}

const fn process(index: usize, name: &'static str) -> Indicator {
    Indicator {
        index,
        name,
        kind: IndicatorKind::Process,
    }
}

/// Number of named indicators.
pub const INDICATOR_COUNT: usize = 42;

/// Panel indicators in front-panel order.
pub static INDICATORS: [Indicator; INDICATOR_COUNT] = [
    // Valves A0-A10
    valve(21, "A0"),
    valve(51, "A1"),
    valve(42, "A2"),
    valve(59, "A3"),
    valve(54, "A4"),
    valve(48, "A5"),
    valve(56, "A6"),
    valve(50, "A7"),
    valve(41, "A8"),
    valve(39, "A9"),
    valve(45, "A10"),
    // Operating modes
    valve(47, "START"),
    process(60, "Condensing He3"),
    process(61, "Condensing He4"),
    process(62, "Normal Circulation"),
    process(63, "Recovery"),
    valve(5, "AUX-1"),
    process(9, "Reset"),
    process(53, "Auto"),
    // Valves 0-17
    valve(36, "0"),
    valve(30, "1"),
    valve(35, "2"),
    valve(33, "3"),
    valve(6, "4"),
    valve(8, "5"),
    valve(26, "6"),
    valve(23, "7"),
    valve(29, "8"),
    valve(11, "9"),
    valve(18, "10"),
    valve(20, "11"),
    valve(17, "12"),
    valve(14, "13"),
    valve(12, "14"),
    valve(2, "15"),
    valve(3, "16"),
    valve(27, "17"),
    // Pumps S1-S5
    process(38, "S1"),
    process(32, "S2"),
    process(24, "S3"),
    process(57, "S4"),
    process(44, "S5"),
];

/// Look up the indicator wired to `index`.
pub fn indicator_at(index: usize) -> Option<&'static Indicator> {
    INDICATORS.iter().find(|i| i.index == index)
}

// =============================================================================
// Change Tracking
// =============================================================================

/// A lit/unlit transition of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorChange {
    pub indicator: &'static Indicator,
    pub lit: bool,
}

impl std::fmt::Display for IndicatorChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let word = if self.lit {
            self.indicator.kind.on_word()
        } else {
            self.indicator.kind.off_word()
        };
        write!(f, "'{}' {}", self.indicator.name, word)
    }
}

/// Remembers which indicators are lit and reports transitions.
///
/// All indicators start unlit. `Unknown` states and missing indices leave
/// an indicator as it was.
#[derive(Debug, Clone)]
pub struct IndicatorTracker {
    lit: [bool; INDICATOR_COUNT],
}

impl Default for IndicatorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorTracker {
    pub fn new() -> Self {
        Self {
            lit: [false; INDICATOR_COUNT],
        }
    }

    pub fn is_lit(&self, name: &str) -> bool {
        INDICATORS
            .iter()
            .position(|i| i.name.eq_ignore_ascii_case(name))
            .is_some_and(|pos| self.lit[pos])
    }

    /// Apply a key map and return the transitions it caused, in table order.
    pub fn update(&mut self, keys: &KeyStatusMap) -> Vec<IndicatorChange> {
        let mut changes = Vec::new();

        for (pos, indicator) in INDICATORS.iter().enumerate() {
            let lit = match keys.get(indicator.index) {
                Some(KeyState::Asserted) => true,
                Some(KeyState::Deasserted) => false,
                Some(KeyState::Unknown) | None => continue,
            };

            if self.lit[pos] != lit {
                self.lit[pos] = lit;
                changes.push(IndicatorChange { indicator, lit });
            }
        }

        changes
    }
}
