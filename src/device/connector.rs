//! Opens the two devices the acquisition loop polls.

use crate::device::gauge::{MaxiGauge, PressureGauge};
use crate::device::panel::{GhsPanel, PanelDevice};
use crate::error::Result;

/// Factory for the panel and gauge links, called from the worker thread.
pub trait DeviceConnector: Send + 'static {
    fn connect_panel(&self, port: &str) -> Result<Box<dyn PanelDevice>>;

    fn connect_gauge(&self, port: &str) -> Result<Box<dyn PressureGauge>>;
}

/// Opens real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl DeviceConnector for SerialConnector {
    fn connect_panel(&self, port: &str) -> Result<Box<dyn PanelDevice>> {
        Ok(Box::new(GhsPanel::connect(port)?))
    }

    fn connect_gauge(&self, port: &str) -> Result<Box<dyn PressureGauge>> {
        Ok(Box::new(MaxiGauge::connect(port)?))
    }
}
