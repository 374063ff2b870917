//! Device layer for the gas handling panel and the gauge controller.
//!
//! Provides the serial link, both protocol adapters and the connector the
//! acquisition loop uses to open them.

pub mod connector;
pub mod gauge;
pub mod link;
pub mod panel;

pub use connector::{DeviceConnector, SerialConnector};
pub use gauge::{GaugeReading, MaxiGauge, PressureGauge, SensorStatus};
pub use link::{SerialSettings, Transport};
pub use panel::{GhsPanel, PanelDevice};
