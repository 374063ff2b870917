//! Operator configuration: device ports and poll pacing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionSettings, DEFAULT_COARSE_STEP, DEFAULT_PERIOD};
use crate::error::{GhsError, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default port of the GHS panel.
pub const DEFAULT_PANEL_PORT: &str = "COM3";

/// Default port of the gauge controller.
pub const DEFAULT_GAUGE_PORT: &str = "COM4";

fn default_panel_port() -> String {
    DEFAULT_PANEL_PORT.to_string()
}

fn default_gauge_port() -> String {
    DEFAULT_GAUGE_PORT.to_string()
}

fn default_update_interval() -> f64 {
    DEFAULT_PERIOD.as_secs_f64()
}

fn default_coarse_wait_ms() -> u64 {
    DEFAULT_COARSE_STEP.as_millis() as u64
}

// =============================================================================
// AppConfig
// =============================================================================

/// Persisted configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial port of the GHS panel.
    #[serde(default = "default_panel_port")]
    pub panel_port: String,

    /// Serial port of the gauge controller.
    #[serde(default = "default_gauge_port")]
    pub gauge_port: String,

    /// Nominal poll period in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: f64,

    /// Coarse wait increment in milliseconds.
    #[serde(default = "default_coarse_wait_ms")]
    pub coarse_wait_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            panel_port: default_panel_port(),
            gauge_port: default_gauge_port(),
            update_interval_secs: default_update_interval(),
            coarse_wait_ms: default_coarse_wait_ms(),
        }
    }
}

impl AppConfig {
    /// Check ranges.
    ///
    /// # Errors
    /// `InvalidConfig` for an empty port, a non-positive or non-finite
    /// period, or a zero coarse wait.
    pub fn validate(&self) -> Result<()> {
        if self.panel_port.trim().is_empty() {
            return Err(GhsError::InvalidConfig("Panel port is empty".into()));
        }
        if self.gauge_port.trim().is_empty() {
            return Err(GhsError::InvalidConfig("Gauge port is empty".into()));
        }
        if !self.update_interval_secs.is_finite() || self.update_interval_secs <= 0.0 {
            return Err(GhsError::InvalidConfig(format!(
                "Update interval must be a positive number of seconds, got {}",
                self.update_interval_secs
            )));
        }
        if self.coarse_wait_ms == 0 {
            return Err(GhsError::InvalidConfig(
                "Coarse wait must be at least 1 ms".into(),
            ));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_interval_secs)
    }

    /// Validated settings for one acquisition run.
    pub fn acquisition_settings(&self) -> Result<AcquisitionSettings> {
        self.validate()?;
        Ok(
            AcquisitionSettings::new(self.panel_port.clone(), self.gauge_port.clone())
                .with_period(self.update_interval())
                .with_coarse_step(Duration::from_millis(self.coarse_wait_ms)),
        )
    }
}
