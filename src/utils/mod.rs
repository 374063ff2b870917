pub mod formatting;
pub mod indicators;

// Re-export commonly used items
pub use formatting::format_pressure;
pub use indicators::{INDICATORS, IndicatorTracker};
