//! Circuit breaker: `{Closed, Open, HalfOpen}` with atomic state and atomic
//! failure counter (spec §4.4).

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, calls allowed.
    Closed = 0,
    /// Failing, calls denied except the single probe that wins the
    /// Open→HalfOpen CAS.
    Open = 1,
    /// Probing after `reset_after`, exactly one caller admitted.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping from `Closed` to `Open`.
    pub threshold: u32,
    /// How long to wait in `Open` before admitting one `HalfOpen` probe.
    pub reset_after: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        // Standardized on 5 minutes per DESIGN.md's Open Question decision;
        // adapters that want faster half-open probing override this.
        Self {
            threshold: 5,
            reset_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Lock-free three-state circuit breaker guarding calls to the remote
/// backend.
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    last_failure_millis: AtomicI64,
    config: CircuitBreakerConfig,
    start: Instant,
}

impl CircuitBreaker {
    /// Construct a new breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            last_failure_millis: AtomicI64::new(0),
            config,
            start: Instant::now(),
        }
    }

    fn now_millis(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    /// The current state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may proceed.
    ///
    /// `Closed` always allows. `Open` allows only once `reset_after` has
    /// elapsed, and only the caller that wins the CAS from `Open` to
    /// `HalfOpen` is admitted — others observe `HalfOpen` and are denied.
    /// `HalfOpen` always denies (only the winning CAS caller got in, via
    /// the `Open` branch, in the same call).
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_failure = self.last_failure_millis.load(Ordering::Acquire);
                let elapsed = self.now_millis() - last_failure;
                if elapsed > self.config.reset_after.as_millis() as i64 {
                    self.state
                        .compare_exchange(
                            CircuitState::Open as u8,
                            CircuitState::HalfOpen as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// Record a successful call: reset the failure counter and close the
    /// circuit.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
    }

    /// Record a failed call: saturating-increment the failure counter; once
    /// it reaches `threshold`, trip from `Closed` or `HalfOpen` to `Open`
    /// and stamp `last_failure`.
    pub fn record_failure(&self) {
        let previous = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_add(1))
            })
            .expect("update closure always returns Some");
        let new_count = previous.saturating_add(1);

        if new_count >= self.config.threshold {
            self.last_failure_millis.store(self.now_millis(), Ordering::Release);
            let current = self.state();
            if current == CircuitState::Closed {
                let _ = self.state.compare_exchange(
                    CircuitState::Closed as u8,
                    CircuitState::Open as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            } else if current == CircuitState::HalfOpen {
                let _ = self.state.compare_exchange(
                    CircuitState::HalfOpen as u8,
                    CircuitState::Open as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_after: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            threshold,
            reset_after,
        })
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let b = breaker(3, Duration::from_secs(60));
        assert!(b.allow());
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn half_open_admits_exactly_one_probe_then_closes_on_success() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert!(b.allow());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(!b.allow());
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.allow());
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(b.allow());
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn failure_counter_saturates_without_overflow() {
        let b = breaker(u32::MAX, Duration::from_secs(60));
        for _ in 0..1000 {
            b.record_failure();
        }
        assert_eq!(b.failures.load(Ordering::Acquire), 1000);
    }
}
