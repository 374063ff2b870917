//! Events the acquisition worker publishes to its consumer.

use chrono::{DateTime, Local};
use crossbeam::channel::{Sender, TrySendError};
use tracing::warn;

use crate::error::GhsError;
use crate::protocol::{KeyStatusMap, PanelErrorCode, PanelReading};

/// Events held for a slow consumer before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Timestamp suffix format of diagnostic lines.
const LOG_TIMESTAMP_FORMAT: &str = "[%H:%M:%S, %d-%m-%Y]";

/// Lifecycle of the acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Initializing,
    Running,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "Idle"),
            AcquisitionState::Initializing => write!(f, "Initializing"),
            AcquisitionState::Running => write!(f, "Running"),
        }
    }
}

/// Sub-step of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Adc,
    Keys,
    Pressures,
}

impl PollStep {
    pub const fn label(&self) -> &'static str {
        match self {
            PollStep::Adc => "ADC",
            PollStep::Keys => "KEYS",
            PollStep::Pressures => "PRESSURES",
        }
    }
}

/// Why a poll step produced no values.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFault {
    pub step: PollStep,
    /// Set when the panel answered with a non-zero error code.
    pub reported_code: Option<PanelErrorCode>,
    pub cause: String,
}

impl StepFault {
    pub fn from_error(step: PollStep, err: &GhsError) -> Self {
        Self {
            step,
            reported_code: err.reported_code(),
            cause: err.to_string(),
        }
    }

    pub fn is_device_reported(&self) -> bool {
        self.reported_code.is_some()
    }
}

impl std::fmt::Display for StepFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reported_code {
            Some(code) => write!(
                f,
                "[{}] Error code returned: {} ({})",
                self.step.label(),
                code.code(),
                code
            ),
            None => write!(
                f,
                "[{}] Couldn't get values: {}",
                self.step.label(),
                self.cause
            ),
        }
    }
}

/// Payload of an [`AcquisitionEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    AdcOk(PanelReading),
    AdcError(StepFault),
    KeysOk(KeyStatusMap),
    KeysError(StepFault),
    /// One magnitude per gauge channel.
    PressuresOk(Vec<f64>),
    PressuresError(StepFault),
    /// Free-text diagnostic for the operator log.
    Message(String),
    /// Paired with every fault; `true` once initialization has failed.
    Problem(bool),
    State(AcquisitionState),
}

/// Timestamped event.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl AcquisitionEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
        }
    }

    /// `message [HH:MM:SS, DD-MM-YYYY]` for diagnostic messages.
    pub fn log_line(&self) -> Option<String> {
        match &self.kind {
            EventKind::Message(message) => Some(format!(
                "{} {}",
                message,
                self.timestamp.format(LOG_TIMESTAMP_FORMAT)
            )),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&StepFault> {
        match &self.kind {
            EventKind::AdcError(f) | EventKind::KeysError(f) | EventKind::PressuresError(f) => {
                Some(f)
            }
            _ => None,
        }
    }
}

/// Sending half used by the worker. Never blocks: a consumer that went away
/// is ignored, and events are dropped while the queue is full.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<AcquisitionEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<AcquisitionEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, kind: EventKind) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(AcquisitionEvent::new(kind)) {
            warn!(kind = ?event.kind, "Event queue full, dropping event");
        }
    }

    pub fn message(&self, message: impl Into<String>) {
        self.emit(EventKind::Message(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_line_format() {
        let event = AcquisitionEvent {
            timestamp: Local.with_ymd_and_hms(2015, 1, 23, 9, 14, 24).unwrap(),
            kind: EventKind::Message("Started".into()),
        };
        assert_eq!(
            event.log_line().as_deref(),
            Some("Started [09:14:24, 23-01-2015]")
        );
        assert!(AcquisitionEvent::new(EventKind::Problem(false)).log_line().is_none());
    }

    #[test]
    fn test_fault_messages_distinguish_kinds() {
        let reported = StepFault::from_error(
            PollStep::Adc,
            &GhsError::DeviceReported {
                command: "ADC?".into(),
                code: PanelErrorCode::Execution,
            },
        );
        assert!(reported.is_device_reported());
        assert_eq!(
            reported.to_string(),
            "[ADC] Error code returned: 5 (Execution error)"
        );

        let transport = StepFault::from_error(
            PollStep::Keys,
            &GhsError::Timeout {
                command: "KEYS?".into(),
            },
        );
        assert!(!transport.is_device_reported());
        assert!(transport.to_string().starts_with("[KEYS] Couldn't get values"));
    }

    #[test]
    fn test_sink_ignores_dropped_consumer() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let sink = EventSink::new(tx);
        drop(rx);
        sink.message("nobody listening");
    }

    #[test]
    fn test_sink_drops_when_queue_full() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let sink = EventSink::new(tx);
        sink.message("first");
        sink.message("second");

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, EventKind::Message("first".into()));
    }
}
