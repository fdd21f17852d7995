//! Fault-injection knobs for resilience testing.
//!
//! Loaded once from settings at startup and immutable afterwards. Only the
//! router worker consults them: a sampled drop skips the dispatch (the
//! reconciler later fails the command), and a configured latency range
//! stretches each dispatch by a uniform sample.

use bridge_models::settings::Chaos;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChaosKnobs {
    latency: Option<(Duration, Duration)>,
    drop_rate: f64,
}

impl ChaosKnobs {
    pub fn from_settings(chaos: &Chaos) -> Self {
        let latency = match (chaos.latency_min_ms, chaos.latency_max_ms) {
            (Some(min), Some(max)) if max >= min && max > 0 => Some((
                Duration::from_millis(min),
                Duration::from_millis(max),
            )),
            _ => None,
        };
        Self {
            latency,
            drop_rate: chaos.drop_rate.clamp(0.0, 1.0),
        }
    }

    /// Sample the drop decision for one dispatch.
    pub fn should_drop(&self) -> bool {
        self.drop_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.drop_rate
    }

    /// Sample an injected latency in `[min, max)`, if configured.
    pub fn sample_latency(&self) -> Option<Duration> {
        let (min, max) = self.latency?;
        if min == max {
            return Some(min);
        }
        let ms = rand::thread_rng().gen_range(min.as_millis() as u64..max.as_millis() as u64);
        Some(Duration::from_millis(ms))
    }

    pub fn is_active(&self) -> bool {
        self.latency.is_some() || self.drop_rate > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_by_default() {
        let knobs = ChaosKnobs::from_settings(&Chaos::default());
        assert!(!knobs.is_active());
        assert!(!knobs.should_drop());
        assert!(knobs.sample_latency().is_none());
    }

    #[test]
    fn drop_rate_one_always_drops() {
        let knobs = ChaosKnobs::from_settings(&Chaos {
            latency_min_ms: None,
            latency_max_ms: None,
            drop_rate: 1.0,
        });
        for _ in 0..100 {
            assert!(knobs.should_drop());
        }
    }

    #[test]
    fn drop_rate_zero_never_drops() {
        let knobs = ChaosKnobs::from_settings(&Chaos::default());
        for _ in 0..100 {
            assert!(!knobs.should_drop());
        }
    }

    #[test]
    fn latency_samples_stay_within_bounds() {
        let knobs = ChaosKnobs::from_settings(&Chaos {
            latency_min_ms: Some(100),
            latency_max_ms: Some(200),
            drop_rate: 0.0,
        });
        for _ in 0..100 {
            let d = knobs.sample_latency().unwrap();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(200));
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        let knobs = ChaosKnobs::from_settings(&Chaos {
            latency_min_ms: Some(150),
            latency_max_ms: Some(150),
            drop_rate: 0.0,
        });
        assert_eq!(knobs.sample_latency(), Some(Duration::from_millis(150)));
    }
}
