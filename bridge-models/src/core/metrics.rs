use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    RwLock,
};
use sysinfo::System;

/// Process-wide dispatch counters with atomic updates.
///
/// Updated from the submission path, the queue worker, the result handlers
/// and the reconcilers; snapshotted by `GET /metrics`.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Submissions that passed validation.
    pub commands_submitted: AtomicU64,
    /// Fresh commands persisted and enqueued.
    pub commands_accepted: AtomicU64,
    /// Submissions collapsed onto an existing (device, key) command.
    pub commands_deduplicated: AtomicU64,
    /// Submissions rejected because the in-flight queue was full.
    pub queue_rejections: AtomicU64,
    /// Commands handed to the device transport.
    pub commands_dispatched: AtomicU64,
    /// Dispatches skipped by an open breaker.
    pub breaker_skips: AtomicU64,
    /// Dispatches dropped by chaos injection.
    pub chaos_drops: AtomicU64,
    /// Commands that reached a terminal completed state.
    pub commands_completed: AtomicU64,
    /// Commands that reached a terminal failed state (any reason).
    pub commands_failed: AtomicU64,
    /// Failed commands whose reason was the response timeout.
    pub commands_timed_out: AtomicU64,
    /// Telemetry samples ingested.
    pub telemetry_ingested: AtomicU64,
    /// Current depth of the in-flight queue.
    pub queue_depth: AtomicI64,
    /// Last time any counter moved.
    pub last_update: RwLock<Option<DateTime<Utc>>>,
}

impl DispatchMetrics {
    #[inline]
    pub fn incr(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn enqueue(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dequeue(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    fn touch(&self) {
        *self.last_update.write().unwrap() = Some(Utc::now());
    }

    /// Get a consistent snapshot of all counters.
    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            commands_submitted: self.commands_submitted.load(Ordering::Relaxed),
            commands_accepted: self.commands_accepted.load(Ordering::Relaxed),
            commands_deduplicated: self.commands_deduplicated.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            breaker_skips: self.breaker_skips.load(Ordering::Relaxed),
            chaos_drops: self.chaos_drops.load(Ordering::Relaxed),
            commands_completed: self.commands_completed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
            telemetry_ingested: self.telemetry_ingested.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed).max(0),
            last_update: *self.last_update.read().unwrap(),
        }
    }
}

/// Serializable snapshot of the dispatch counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMetricsSnapshot {
    pub commands_submitted: u64,
    pub commands_accepted: u64,
    pub commands_deduplicated: u64,
    pub queue_rejections: u64,
    pub commands_dispatched: u64,
    pub breaker_skips: u64,
    pub chaos_drops: u64,
    pub commands_completed: u64,
    pub commands_failed: u64,
    pub commands_timed_out: u64,
    pub telemetry_ingested: u64,
    pub queue_depth: i64,
    pub last_update: Option<DateTime<Utc>>,
}

/// System information including real-time usage figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os_type: String,
    pub os_arch: String,
    pub hostname: Option<String>,
    pub cpu_cores: usize,
    pub total_memory: u64,
    pub used_memory: u64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
}

impl SystemInfo {
    /// Collect a point-in-time reading of host usage.
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory = sys.total_memory();
        let used_memory = sys.used_memory();
        let memory_usage_percent = if total_memory > 0 {
            (used_memory as f64 / total_memory as f64) * 100.0
        } else {
            0.0
        };

        Self {
            os_type: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_arch: std::env::consts::ARCH.to_string(),
            hostname: System::host_name(),
            cpu_cores: sys.cpus().len(),
            total_memory,
            used_memory,
            memory_usage_percent,
            cpu_usage_percent: sys.global_cpu_usage() as f64,
        }
    }
}

/// Full payload served by `GET /metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub uptime_seconds: i64,
    pub devices_total: u64,
    pub devices_online: u64,
    pub dispatch: DispatchMetricsSnapshot,
    pub system: SystemInfo,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_updates() {
        let m = DispatchMetrics::default();
        m.incr(&m.commands_submitted);
        m.incr(&m.commands_submitted);
        m.incr(&m.commands_failed);
        m.enqueue();

        let snap = m.snapshot();
        assert_eq!(snap.commands_submitted, 2);
        assert_eq!(snap.commands_failed, 1);
        assert_eq!(snap.queue_depth, 1);
        assert!(snap.last_update.is_some());
    }

    #[test]
    fn queue_depth_never_reported_negative() {
        let m = DispatchMetrics::default();
        m.dequeue();
        assert_eq!(m.snapshot().queue_depth, 0);
    }
}
