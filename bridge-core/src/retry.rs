//! Bounded-attempt retry with jittered delays.
//!
//! The executor exists both to absorb transient transport failures and to
//! de-correlate retry storms across devices: every delay carries an
//! independent uniform jitter sample, so a burst of simultaneous failures
//! fans back out over time instead of retrying in lockstep.

use bridge_error::{BridgeError, BridgeResult};
use rand::Rng;
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

/// Executes an operation up to `base_delays.len()` times, sleeping
/// `base_delays[i] + U[0, jitter)` after each failed attempt.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    base_delays: Vec<Duration>,
    jitter: Duration,
}

impl RetryExecutor {
    pub fn new(base_delays_ms: &[u64], jitter_ms: u64) -> Self {
        Self {
            base_delays: base_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    /// Invoke `op` until it reports success or the attempts are exhausted.
    ///
    /// A false return and an attempt that never resolves to true are treated
    /// identically: retryable. Cancellation during a delay propagates
    /// immediately as an error.
    pub async fn execute<F, Fut>(&self, mut op: F, cancel: &CancellationToken) -> BridgeResult<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for base in &self.base_delays {
            if cancel.is_cancelled() {
                return Err(BridgeError::ShutdownError("retry cancelled".into()));
            }
            if op().await {
                return Ok(true);
            }

            let delay = *base + self.sample_jitter();
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(BridgeError::ShutdownError("retry cancelled".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(false)
    }

    fn sample_jitter(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };
    use tokio::time::Instant;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(&[100, 300, 700], 50)
    }

    #[tokio::test(start_paused = true)]
    async fn success_short_circuits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let ok = executor()
            .execute(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { true }
                },
                &cancel,
            )
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_exactly_three_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let ok = executor()
            .execute(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { false }
                },
                &cancel,
            )
            .await
            .unwrap();

        assert!(!ok);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn aggregate_delay_within_jitter_envelope() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let ok = executor()
            .execute(|| async { false }, &cancel)
            .await
            .unwrap();
        assert!(!ok);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1100), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1250), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn delays_are_jittered_not_fixed() {
        let cancel = CancellationToken::new();
        let mut observed = std::collections::HashSet::new();
        for _ in 0..100 {
            let started = Instant::now();
            let _ = executor()
                .execute(|| async { false }, &cancel)
                .await
                .unwrap();
            observed.insert(started.elapsed().as_millis());
        }
        assert!(observed.len() > 1, "retry delays must not be fixed");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_propagates_immediately() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            RetryExecutor::new(&[100, 300, 700], 50)
                .execute(|| async { false }, &token)
                .await
        });

        // Let the first attempt fail and the first delay start.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let res = handle.await.unwrap();
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_jitter_is_deterministic() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let _ = RetryExecutor::new(&[100, 300, 700], 0)
            .execute(|| async { false }, &cancel)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(1100));
    }
}
