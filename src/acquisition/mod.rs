//! Acquisition core.
//!
//! Fixed-period polling of the panel ADC, panel keys and gauge pressures on
//! a background worker, with per-step fault containment.

mod cadence;
mod events;
mod scheduler;

pub use cadence::{Cadence, DEFAULT_COARSE_STEP, DEFAULT_PERIOD};
pub use events::{
    AcquisitionEvent, AcquisitionState, EVENT_QUEUE_CAPACITY, EventKind, EventSink, PollStep,
    StepFault,
};
pub use scheduler::{Acquisition, AcquisitionSettings, drain_until_idle};
