//! Device liveness monitor.
//!
//! Sweeps the device registry on a fixed period and flips reachability
//! status by the last-seen threshold: stale devices go offline, recently
//! seen devices come (back) online. Transitions are written in one
//! transaction per sweep and announced to operators.

use crate::hub::OperatorHub;
use bridge_error::BridgeResult;
use bridge_models::{
    domain::prelude::OperatorEvent, enums::common::DeviceStatus, settings::Liveness, BroadcastHub,
};
use bridge_repository::DeviceRepository;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct LivenessMonitor {
    db: DatabaseConnection,
    operator_hub: Arc<OperatorHub>,
    sweep_interval: Duration,
    offline_after: ChronoDuration,
    shutdown: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(
        db: DatabaseConnection,
        operator_hub: Arc<OperatorHub>,
        liveness: &Liveness,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            operator_hub,
            sweep_interval: Duration::from_millis(liveness.sweep_interval_ms),
            offline_after: ChronoDuration::milliseconds(liveness.offline_after_ms as i64),
            shutdown,
        }
    }

    /// Spawn the sweep loop. The first sweep runs one full period after
    /// start; missed ticks are skipped, not replayed.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + self.sweep_interval,
                self.sweep_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("liveness monitor started");

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "liveness sweep failed");
                        }
                    }
                }
            }
            info!("liveness monitor stopped");
        })
    }

    async fn sweep(&self) -> BridgeResult<()> {
        let devices = DeviceRepository::find_all(Some(&self.db)).await?;
        let now = Utc::now();

        let mut transitions: Vec<(String, DeviceStatus)> = Vec::new();
        for device in devices {
            let Some(target) = target_status(device.last_seen, now, self.offline_after) else {
                continue;
            };
            if device.status != target {
                transitions.push((device.id, target));
            }
        }

        if transitions.is_empty() {
            return Ok(());
        }

        // Batch the sweep's writes into a single transaction.
        let txn = self.db.begin().await?;
        for (id, status) in &transitions {
            DeviceRepository::set_status(id, *status, Some(&txn)).await?;
        }
        txn.commit().await?;

        for (device_id, status) in transitions {
            info!(device_id, %status, "device status changed");
            self.operator_hub.publish(OperatorEvent::DeviceStatusChanged { device_id, status });
        }
        Ok(())
    }
}

/// Status a device should hold at sweep time, by the last-seen threshold.
/// Devices that have never been seen keep their provisioned status.
fn target_status(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    offline_after: ChronoDuration,
) -> Option<DeviceStatus> {
    let seen = last_seen?;
    if now - seen > offline_after {
        Some(DeviceStatus::Offline)
    } else {
        Some(DeviceStatus::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: i64 = 30_000;

    fn threshold() -> ChronoDuration {
        ChronoDuration::milliseconds(THRESHOLD)
    }

    #[test]
    fn never_seen_devices_are_left_alone() {
        assert_eq!(target_status(None, Utc::now(), threshold()), None);
    }

    #[test]
    fn stale_device_goes_offline() {
        let now = Utc::now();
        let seen = now - ChronoDuration::milliseconds(THRESHOLD + 1);
        assert_eq!(
            target_status(Some(seen), now, threshold()),
            Some(DeviceStatus::Offline)
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        // Exactly at the threshold the device is still considered reachable.
        let now = Utc::now();
        let seen = now - threshold();
        assert_eq!(
            target_status(Some(seen), now, threshold()),
            Some(DeviceStatus::Online)
        );
    }

    #[test]
    fn recently_seen_device_is_online() {
        let now = Utc::now();
        let seen = now - ChronoDuration::milliseconds(500);
        assert_eq!(
            target_status(Some(seen), now, threshold()),
            Some(DeviceStatus::Online)
        );
    }
}
