//! GHS-DRS1000 Monitor Library
//!
//! Acquisition core for the gas handling system of a DRS1000 dilution
//! refrigerator: the panel's line protocol, a six-channel vacuum gauge
//! client, and a fixed-period polling worker.
//!
//! # Features
//!
//! - Read calibrated ADC channels, key/indicator states and system status
//! - Read gauge pressures
//! - Poll both devices on a background worker with per-step fault containment
//!
//! # Example
//!
//! ```no_run
//! use ghs_monitor::acquisition::{Acquisition, AcquisitionSettings, EventKind};
//! use ghs_monitor::device::SerialConnector;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut acquisition = Acquisition::new();
//!     let events = acquisition.start(
//!         AcquisitionSettings::new("/dev/ttyUSB0", "/dev/ttyUSB1"),
//!         SerialConnector,
//!     )?;
//!
//!     for event in events.iter() {
//!         match event.kind {
//!             EventKind::AdcOk(reading) => println!("{}", reading),
//!             EventKind::Problem(true) => break,
//!             _ => {}
//!         }
//!     }
//!
//!     acquisition.stop()?;
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use acquisition::{Acquisition, AcquisitionEvent, AcquisitionSettings, EventKind};
pub use device::{GhsPanel, MaxiGauge};
pub use error::{GhsError, Result};
