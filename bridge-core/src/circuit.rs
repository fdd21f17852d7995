//! Per-device circuit breakers.
//!
//! A breaker trips after a run of consecutive dispatch failures and blocks
//! dispatch for a fixed window, protecting both the device and the worker
//! from hammering a dead link. After the window it goes half-open and lets a
//! probe dispatch through; a success closes it again.

use dashmap::DashMap;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure breaker for one device.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_window: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_window: Duration) -> Self {
        Self {
            failure_threshold,
            open_window,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// A successful dispatch fully resets the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures = 0;
        inner.opened_at = None;
    }

    /// A failed dispatch increments the run; at or beyond the threshold the
    /// open window restarts, so a failed half-open probe re-opens.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        if inner.failures >= self.failure_threshold {
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().unwrap();
        if inner.failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        match inner.opened_at {
            Some(opened_at) if opened_at.elapsed() < self.open_window => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    #[cfg(test)]
    fn failures(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }
}

/// Registry of per-device breaker instances.
///
/// `get` has created-once semantics: concurrent calls for the same device id
/// observe the same instance.
pub struct CircuitRegistry {
    failure_threshold: u32,
    open_window: Duration,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitRegistry {
    pub fn new(failure_threshold: u32, open_window: Duration) -> Self {
        Self {
            failure_threshold,
            open_window,
            breakers: DashMap::new(),
        }
    }

    /// Return the stable breaker for a device, creating it on first use.
    pub fn get(&self, device_id: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(device_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.failure_threshold,
                    self.open_window,
                ))
            })
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(window_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_millis(window_ms))
    }

    #[test]
    fn stays_closed_below_threshold() {
        let b = breaker(10_000);
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(!b.is_open());
    }

    #[test]
    fn opens_at_threshold() {
        let b = breaker(10_000);
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_the_run() {
        let b = breaker(10_000);
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        assert_eq!(b.failures(), 0);
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_window_elapses() {
        let b = breaker(20);
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn failed_probe_reopens() {
        let b = breaker(20);
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn registry_returns_stable_instances() {
        let registry = CircuitRegistry::new(5, Duration::from_secs(10));
        let a = registry.get("d01");
        let b = registry.get("d01");
        let other = registry.get("d02");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn registry_isolates_devices() {
        let registry = CircuitRegistry::new(5, Duration::from_secs(10));
        for _ in 0..5 {
            registry.get("d01").record_failure();
        }
        assert!(registry.get("d01").is_open());
        assert!(!registry.get("d02").is_open());
    }
}
