//! Fixed-period pacing for the poll loop.
//!
//! Each cycle measures its own start, so latency never accumulates across
//! cycles. The wait is split in two: coarse increments while more than one
//! increment remains (each increment is also a chance to notice a stop
//! request), then a single top-off sleep of the exact remainder.

use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};

/// Default poll period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Default coarse wait increment.
pub const DEFAULT_COARSE_STEP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: Duration,
    coarse_step: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, DEFAULT_COARSE_STEP)
    }
}

impl Cadence {
    pub fn new(period: Duration, coarse_step: Duration) -> Self {
        Self {
            period,
            coarse_step,
        }
    }

    /// Time left in a cycle that has been running for `elapsed`. Never negative.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }

    /// Block until the cycle begun at `started` has lasted one period.
    ///
    /// Returns `false` as soon as a stop request arrives on `stop` (or its
    /// sender is dropped), `true` once the period has elapsed.
    pub fn wait(&self, started: Instant, stop: &Receiver<()>) -> bool {
        while self.remaining(started.elapsed()) > self.coarse_step {
            if interrupted(stop.recv_timeout(self.coarse_step)) {
                return false;
            }
        }

        loop {
            let left = self.remaining(started.elapsed());
            if left.is_zero() {
                return true;
            }
            if interrupted(stop.recv_timeout(left)) {
                return false;
            }
        }
    }
}

fn interrupted(result: Result<(), RecvTimeoutError>) -> bool {
    !matches!(result, Err(RecvTimeoutError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn test_remaining_never_negative() {
        let cadence = Cadence::default();
        assert_eq!(
            cadence.remaining(Duration::from_millis(300)),
            Duration::from_millis(700)
        );
        assert_eq!(cadence.remaining(Duration::from_secs(3)), Duration::ZERO);
    }

    #[test]
    fn test_wait_fills_period() {
        let (_tx, rx) = bounded::<()>(1);
        let cadence = Cadence::new(Duration::from_millis(250), Duration::from_millis(50));
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(30));
        assert!(cadence.wait(started, &rx));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(250 + 50 + 100), "{:?}", elapsed);
    }

    #[test]
    fn test_wait_returns_immediately_when_overdue() {
        let (_tx, rx) = bounded::<()>(1);
        let cadence = Cadence::new(Duration::from_millis(10), Duration::from_millis(5));
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        let before = Instant::now();
        assert!(cadence.wait(started, &rx));
        assert!(before.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_wait_interrupted_by_stop() {
        let (tx, rx) = bounded::<()>(1);
        let cadence = Cadence::new(Duration::from_secs(5), Duration::from_millis(200));
        tx.send(()).unwrap();
        let started = Instant::now();
        assert!(!cadence.wait(started, &rx));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_interrupted_by_dropped_sender() {
        let (tx, rx) = bounded::<()>(1);
        drop(tx);
        let cadence = Cadence::new(Duration::from_secs(5), Duration::from_millis(200));
        assert!(!cadence.wait(Instant::now(), &rx));
    }
}
