//! Acquisition scheduler: one background worker polling panel and gauge.
//!
//! The worker owns both device links. It talks to the consumer only through
//! the event channel returned by [`Acquisition::start`] and listens for a
//! stop request between poll steps and during the cadence wait. A step in
//! flight is bounded by its link's read timeout, so `stop()` returns within
//! one step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::acquisition::cadence::{Cadence, DEFAULT_COARSE_STEP, DEFAULT_PERIOD};
use crate::acquisition::events::{
    AcquisitionEvent, AcquisitionState, EVENT_QUEUE_CAPACITY, EventKind, EventSink, PollStep,
    StepFault,
};
use crate::device::{DeviceConnector, PanelDevice, PressureGauge};
use crate::error::{GhsError, Result};
use crate::protocol::{Command, PanelReading};

// =============================================================================
// Settings
// =============================================================================

/// Ports and pacing for one acquisition run.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    pub panel_port: String,
    pub gauge_port: String,
    pub period: Duration,
    pub coarse_step: Duration,
}

impl AcquisitionSettings {
    pub fn new(panel_port: impl Into<String>, gauge_port: impl Into<String>) -> Self {
        Self {
            panel_port: panel_port.into(),
            gauge_port: gauge_port.into(),
            period: DEFAULT_PERIOD,
            coarse_step: DEFAULT_COARSE_STEP,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_coarse_step(mut self, coarse_step: Duration) -> Self {
        self.coarse_step = coarse_step;
        self
    }
}

// =============================================================================
// Acquisition
// =============================================================================

struct WorkerHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Handle to the acquisition worker.
///
/// # Example
///
/// ```no_run
/// use ghs_monitor::acquisition::{Acquisition, AcquisitionSettings, EventKind};
/// use ghs_monitor::device::SerialConnector;
///
/// let mut acquisition = Acquisition::new();
/// let events = acquisition.start(
///     AcquisitionSettings::new("/dev/ttyUSB0", "/dev/ttyUSB1"),
///     SerialConnector,
/// )?;
///
/// for event in events.iter().take(10) {
///     if let EventKind::AdcOk(reading) = event.kind {
///         println!("{}", reading);
///     }
/// }
/// acquisition.stop()?;
/// # Ok::<(), ghs_monitor::error::GhsError>(())
/// ```
pub struct Acquisition {
    state: Arc<Mutex<AcquisitionState>>,
    problem: Arc<AtomicBool>,
    worker: Option<WorkerHandle>,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AcquisitionState::Idle)),
            problem: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        *self.state.lock()
    }

    /// Sticky flag set when a device failed to connect during start-up.
    pub fn has_problem(&self) -> bool {
        self.problem.load(Ordering::SeqCst)
    }

    /// Spawn the worker and return the event stream.
    ///
    /// The stream holds up to [`EVENT_QUEUE_CAPACITY`] events. The worker
    /// never waits on the consumer; events that do not fit are dropped.
    ///
    /// # Errors
    /// `AlreadyRunning` if a previous worker has not been stopped.
    pub fn start<C: DeviceConnector>(
        &mut self,
        settings: AcquisitionSettings,
        connector: C,
    ) -> Result<Receiver<AcquisitionEvent>> {
        if self.worker.is_some() {
            return Err(GhsError::AlreadyRunning);
        }

        let (event_tx, event_rx) = channel::bounded(EVENT_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = channel::bounded(1);

        self.problem.store(false, Ordering::SeqCst);
        *self.state.lock() = AcquisitionState::Initializing;

        let worker = Worker {
            settings,
            events: EventSink::new(event_tx),
            stop: stop_rx,
            state: Arc::clone(&self.state),
            problem: Arc::clone(&self.problem),
        };

        let thread = std::thread::Builder::new()
            .name("ghs-acquisition".into())
            .spawn(move || worker.run(connector))?;

        self.worker = Some(WorkerHandle { stop_tx, thread });
        Ok(event_rx)
    }

    /// Stop the worker and wait for it to close its links.
    ///
    /// Does nothing if no worker is running.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let _ = worker.stop_tx.try_send(());
        let joined = worker.thread.join();
        *self.state.lock() = AcquisitionState::Idle;

        joined.map_err(|_| GhsError::WorkerPanicked)?;
        info!("Acquisition stopped");
        Ok(())
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop acquisition: {}", e);
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    settings: AcquisitionSettings,
    events: EventSink,
    stop: Receiver<()>,
    state: Arc<Mutex<AcquisitionState>>,
    problem: Arc<AtomicBool>,
}

impl Worker {
    fn run<C: DeviceConnector>(self, connector: C) {
        self.set_state(AcquisitionState::Initializing);

        // Both devices are attempted even if the first one fails.
        let panel = self.bring_up("GHS panel", &self.settings.panel_port, |port| {
            connector.connect_panel(port)
        });
        let gauge = self.bring_up("gauge controller", &self.settings.gauge_port, |port| {
            connector.connect_gauge(port)
        });

        match (panel, gauge) {
            (Some(panel), Some(gauge)) => {
                self.events.message("Initialization looks ok");
                self.set_state(AcquisitionState::Running);
                self.poll_loop(panel, gauge);
            }
            (panel, gauge) => {
                self.set_state(AcquisitionState::Idle);
                // Hold whatever did connect until the consumer stops us.
                let _ = self.stop.recv();
                close(panel, gauge);
            }
        }
    }

    fn bring_up<D>(
        &self,
        name: &str,
        port: &str,
        connect: impl FnOnce(&str) -> Result<D>,
    ) -> Option<D> {
        match connect(port) {
            Ok(device) => {
                info!(port, "Connected to {}", name);
                Some(device)
            }
            Err(e) => {
                error!(port, error = %e, "Cannot connect to {}", name);
                self.problem.store(true, Ordering::SeqCst);
                self.events
                    .message(format!("Can't connect to {} on {}: {}", name, port, e));
                self.events.emit(EventKind::Problem(true));
                None
            }
        }
    }

    fn poll_loop(&self, mut panel: Box<dyn PanelDevice>, mut gauge: Box<dyn PressureGauge>) {
        let cadence = Cadence::new(self.settings.period, self.settings.coarse_step);
        let mut cycle: u64 = 0;

        loop {
            let started = Instant::now();

            self.poll_adc(panel.as_mut());
            if self.stop_requested() {
                break;
            }
            self.poll_keys(panel.as_mut());
            if self.stop_requested() {
                break;
            }
            self.poll_pressures(gauge.as_mut());

            debug!(cycle, busy_ms = started.elapsed().as_millis() as u64, "Poll cycle done");
            cycle += 1;

            if !cadence.wait(started, &self.stop) {
                break;
            }
        }

        close(Some(panel), Some(gauge));
        self.set_state(AcquisitionState::Idle);
    }

    fn poll_adc(&self, panel: &mut dyn PanelDevice) {
        let result = panel.get_adc().and_then(|reply| {
            if reply.is_ok() {
                PanelReading::try_from(reply.values)
            } else {
                Err(GhsError::DeviceReported {
                    command: Command::Adc.to_string(),
                    code: reply.code,
                })
            }
        });

        match result {
            Ok(reading) => self.events.emit(EventKind::AdcOk(reading)),
            Err(e) => {
                let fault = self.fault(PollStep::Adc, &e);
                self.events.emit(EventKind::AdcError(fault));
                self.signal_problem();
            }
        }
    }

    fn poll_keys(&self, panel: &mut dyn PanelDevice) {
        let result = panel.get_keys().and_then(|reply| {
            if reply.is_ok() {
                Ok(reply.values)
            } else {
                Err(GhsError::DeviceReported {
                    command: Command::Keys.to_string(),
                    code: reply.code,
                })
            }
        });

        match result {
            Ok(keys) => self.events.emit(EventKind::KeysOk(keys)),
            Err(e) => {
                let fault = self.fault(PollStep::Keys, &e);
                self.events.emit(EventKind::KeysError(fault));
                self.signal_problem();
            }
        }
    }

    fn poll_pressures(&self, gauge: &mut dyn PressureGauge) {
        match gauge.pressures() {
            Ok(readings) => {
                let values = readings.iter().map(|r| r.pressure).collect();
                self.events.emit(EventKind::PressuresOk(values));
            }
            Err(e) => {
                let fault = self.fault(PollStep::Pressures, &e);
                self.events.emit(EventKind::PressuresError(fault));
                self.signal_problem();
            }
        }
    }

    /// Log a step failure and publish it as a diagnostic message.
    fn fault(&self, step: PollStep, err: &GhsError) -> StepFault {
        let fault = StepFault::from_error(step, err);
        match fault.reported_code {
            Some(code) => warn!(step = step.label(), code = code.code(), "Device reported error"),
            None => warn!(step = step.label(), error = %err, "Poll step failed"),
        }
        self.events.message(fault.to_string());
        fault
    }

    fn signal_problem(&self) {
        self.events
            .emit(EventKind::Problem(self.problem.load(Ordering::SeqCst)));
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    fn set_state(&self, state: AcquisitionState) {
        *self.state.lock() = state;
        info!(%state, "Acquisition state");
        self.events.emit(EventKind::State(state));
    }
}

/// Receive what the worker publishes while it finishes bringing up both
/// devices after a failure, up to and including its `Idle` state event.
///
/// Gives up after `limit` or when the worker is gone.
pub fn drain_until_idle(
    events: &Receiver<AcquisitionEvent>,
    limit: Duration,
) -> Vec<AcquisitionEvent> {
    let deadline = Instant::now() + limit;
    let mut drained = Vec::new();
    while let Ok(event) = events.recv_deadline(deadline) {
        let idle = event.kind == EventKind::State(AcquisitionState::Idle);
        drained.push(event);
        if idle {
            break;
        }
    }
    drained
}

fn close(panel: Option<Box<dyn PanelDevice>>, gauge: Option<Box<dyn PressureGauge>>) {
    if let Some(mut panel) = panel {
        panel.disconnect();
    }
    if let Some(mut gauge) = gauge {
        gauge.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GaugeReading;
    use crate::device::SensorStatus;
    use crate::protocol::{KeyState, KeyStatusMap, PanelErrorCode, PanelReply};
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct Counters {
        panel_closed: Arc<AtomicUsize>,
        gauge_closed: Arc<AtomicUsize>,
        gauge_opened: Arc<AtomicBool>,
        pressure_calls: Arc<AtomicUsize>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        panel_fails: bool,
        gauge_fails: bool,
        keys_fail: bool,
        adc_code: i64,
        step_latency: Duration,
        gauge_latency: Duration,
        counters: Counters,
    }

    struct FakePanel {
        cfg: FakeConnector,
    }

    struct FakeGauge {
        cfg: FakeConnector,
    }

    impl PanelDevice for FakePanel {
        fn get_adc(&mut self) -> Result<PanelReply<Vec<i64>>> {
            std::thread::sleep(self.cfg.step_latency);
            Ok(PanelReply {
                code: PanelErrorCode::from_code(self.cfg.adc_code),
                values: (1..=8).collect(),
            })
        }

        fn get_keys(&mut self) -> Result<PanelReply<KeyStatusMap>> {
            std::thread::sleep(self.cfg.step_latency);
            if self.cfg.keys_fail {
                return Err(GhsError::Timeout {
                    command: "KEYS?".into(),
                });
            }
            Ok(PanelReply {
                code: PanelErrorCode::NoError,
                values: KeyStatusMap::from_values(&[0, 0, 2, 0]),
            })
        }

        fn disconnect(&mut self) {
            self.cfg.counters.panel_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl PressureGauge for FakeGauge {
        fn pressures(&mut self) -> Result<Vec<GaugeReading>> {
            std::thread::sleep(self.cfg.step_latency + self.cfg.gauge_latency);
            self.cfg.counters.pressure_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                GaugeReading {
                    channel: 1,
                    status: SensorStatus::Ok,
                    pressure: 1.0e-3,
                },
                GaugeReading {
                    channel: 2,
                    status: SensorStatus::Ok,
                    pressure: 2.0e-6,
                },
            ])
        }

        fn disconnect(&mut self) {
            self.cfg.counters.gauge_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl DeviceConnector for FakeConnector {
        fn connect_panel(&self, _port: &str) -> Result<Box<dyn PanelDevice>> {
            if self.panel_fails {
                return Err(GhsError::NotConnected);
            }
            Ok(Box::new(FakePanel { cfg: self.clone() }))
        }

        fn connect_gauge(&self, _port: &str) -> Result<Box<dyn PressureGauge>> {
            if self.gauge_fails {
                return Err(GhsError::NotConnected);
            }
            self.counters.gauge_opened.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeGauge { cfg: self.clone() }))
        }
    }

    fn settings(period_ms: u64, coarse_ms: u64) -> AcquisitionSettings {
        AcquisitionSettings::new("panel", "gauge")
            .with_period(Duration::from_millis(period_ms))
            .with_coarse_step(Duration::from_millis(coarse_ms))
    }

    /// Collect events until `done` matches one, or give up after `limit`.
    fn collect_until(
        rx: &Receiver<AcquisitionEvent>,
        limit: Duration,
        mut done: impl FnMut(&AcquisitionEvent) -> bool,
    ) -> Vec<AcquisitionEvent> {
        let deadline = Instant::now() + limit;
        let mut events = Vec::new();
        while let Ok(event) = rx.recv_deadline(deadline) {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
        events
    }

    #[test]
    fn test_cycle_publishes_all_three_streams() {
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), FakeConnector::default()).unwrap();

        let events = collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::PressuresOk(_))
        });
        assert_eq!(acq.state(), AcquisitionState::Running);
        acq.stop().unwrap();

        let kinds: Vec<_> = events.iter().map(|e| &e.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, EventKind::Message(m) if m == "Initialization looks ok")));
        let adc = kinds
            .iter()
            .find_map(|k| match k {
                EventKind::AdcOk(r) => Some(*r),
                _ => None,
            })
            .unwrap();
        assert_eq!(adc.channels, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(kinds.iter().any(|k| matches!(k, EventKind::KeysOk(m) if m.get(2) == Some(KeyState::Asserted))));
        assert!(matches!(kinds.last(), Some(EventKind::PressuresOk(v)) if v.len() == 2));
        assert_eq!(acq.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_keys_failure_does_not_skip_pressures() {
        let connector = FakeConnector {
            keys_fail: true,
            ..Default::default()
        };
        let counters = connector.counters.clone();
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();

        let events = collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::PressuresOk(_))
        });
        acq.stop().unwrap();

        let keys_err = events
            .iter()
            .position(|e| matches!(e.kind, EventKind::KeysError(_)))
            .expect("keys error reported");
        let pressures = events
            .iter()
            .position(|e| matches!(e.kind, EventKind::PressuresOk(_)))
            .expect("pressures still read");
        assert!(keys_err < pressures);
        assert!(matches!(events[keys_err + 1].kind, EventKind::Problem(false)));
        assert!(counters.pressure_calls.load(Ordering::SeqCst) >= 1);
        assert!(!acq.has_problem());
    }

    #[test]
    fn test_device_reported_adc_error() {
        let connector = FakeConnector {
            adc_code: 4,
            ..Default::default()
        };
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();

        let events = collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::AdcError(_))
        });
        acq.stop().unwrap();

        let fault = events.last().and_then(|e| e.fault()).expect("adc fault");
        assert_eq!(fault.step, PollStep::Adc);
        assert_eq!(fault.reported_code, Some(PanelErrorCode::Communication));
        assert!(events.iter().any(|e| {
            matches!(&e.kind, EventKind::Message(m) if m == "[ADC] Error code returned: 4 (Communication error)")
        }));
    }

    #[test]
    fn test_panel_connect_failure_never_runs() {
        let connector = FakeConnector {
            panel_fails: true,
            ..Default::default()
        };
        let counters = connector.counters.clone();
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();

        let events = collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::State(AcquisitionState::Idle))
        });

        assert!(acq.has_problem());
        assert!(events.iter().any(|e| e.kind == EventKind::Problem(true)));
        assert!(
            !events
                .iter()
                .any(|e| e.kind == EventKind::State(AcquisitionState::Running))
        );
        assert!(counters.gauge_opened.load(Ordering::SeqCst));
        assert_eq!(counters.gauge_closed.load(Ordering::SeqCst), 0);

        acq.stop().unwrap();
        assert_eq!(counters.gauge_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.panel_closed.load(Ordering::SeqCst), 0);
        assert_eq!(counters.pressure_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_both_connect_failures_reported() {
        let connector = FakeConnector {
            panel_fails: true,
            gauge_fails: true,
            ..Default::default()
        };
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();

        let events = collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::State(AcquisitionState::Idle))
        });
        acq.stop().unwrap();

        let problems = events
            .iter()
            .filter(|e| e.kind == EventKind::Problem(true))
            .count();
        assert_eq!(problems, 2);
    }

    #[test]
    fn test_drain_after_first_problem_keeps_second_message() {
        let connector = FakeConnector {
            panel_fails: true,
            gauge_fails: true,
            ..Default::default()
        };
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();

        // Stop reading at the first problem, as the monitor does.
        let mut events = collect_until(&rx, Duration::from_secs(2), |e| {
            e.kind == EventKind::Problem(true)
        });
        events.extend(drain_until_idle(&rx, Duration::from_secs(2)));
        acq.stop().unwrap();

        let messages: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Message(m) => Some(m.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Can't connect to GHS panel on panel"));
        assert!(messages[1].starts_with("Can't connect to gauge controller on gauge"));
        assert_eq!(
            events.last().map(|e| &e.kind),
            Some(&EventKind::State(AcquisitionState::Idle))
        );
    }

    #[test]
    fn test_stop_closes_links_once() {
        let connector = FakeConnector::default();
        let counters = connector.counters.clone();
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(100, 20), connector).unwrap();
        collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::PressuresOk(_))
        });

        assert!(matches!(
            acq.start(settings(100, 20), FakeConnector::default()),
            Err(GhsError::AlreadyRunning)
        ));

        acq.stop().unwrap();
        acq.stop().unwrap();
        assert_eq!(counters.panel_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.gauge_closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_prompt_during_long_wait() {
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(5_000, 200), FakeConnector::default()).unwrap();
        collect_until(&rx, Duration::from_secs(2), |e| {
            matches!(e.kind, EventKind::PressuresOk(_))
        });

        let before = Instant::now();
        acq.stop().unwrap();
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cycle_period_holds_with_step_latency() {
        let connector = FakeConnector {
            step_latency: Duration::from_millis(30),
            ..Default::default()
        };
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(300, 50), connector).unwrap();

        let mut adc_count = 0;
        let events = collect_until(&rx, Duration::from_secs(5), |e| {
            if matches!(e.kind, EventKind::AdcOk(_)) {
                adc_count += 1;
            }
            adc_count == 4
        });
        acq.stop().unwrap();

        let stamps: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::AdcOk(_)))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(stamps.len(), 4);

        for pair in stamps.windows(2) {
            let gap = (pair[1] - pair[0]).num_milliseconds();
            assert!(gap >= 290, "cycle too short: {} ms", gap);
            assert!(gap <= 300 + 50 + 60, "cycle too long: {} ms", gap);
        }
    }

    #[test]
    fn test_cycle_period_holds_when_steps_nearly_fill_it() {
        let connector = FakeConnector {
            gauge_latency: Duration::from_millis(190),
            ..Default::default()
        };
        let mut acq = Acquisition::new();
        let rx = acq.start(settings(200, 50), connector).unwrap();

        let mut adc_count = 0;
        let events = collect_until(&rx, Duration::from_secs(5), |e| {
            if matches!(e.kind, EventKind::AdcOk(_)) {
                adc_count += 1;
            }
            adc_count == 5
        });
        acq.stop().unwrap();

        let stamps: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::AdcOk(_)))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(stamps.len(), 5);

        // ADC answers at once, so its timestamp marks the cycle start.
        for pair in stamps.windows(2) {
            let gap = (pair[1] - pair[0]).num_milliseconds();
            assert!(gap >= 199, "cycle too short: {} ms", gap);
            assert!(gap <= 200 + 50 + 40, "cycle too long: {} ms", gap);
        }
    }
}
