//! Device connection hub.
//!
//! Every device has a logical group keyed `device:<id>`; each live transport
//! connection registers into its group and receives the command frames sent
//! to it. The hub is deliberately thin over the transport: `send_command`
//! only guarantees the frame was handed to at least one live connection.
//! Liveness and completion are reconciled by the router's timeout and by the
//! result path below.

use crate::hub::operator::OperatorHub;
use bridge_error::{storage::StorageError, BridgeError, BridgeResult};
use bridge_models::{
    core::metrics::DispatchMetrics,
    domain::prelude::{CommandFrame, CommandOutcome, CommandSnapshot, OperatorEvent},
    enums::common::CommandStatus,
    BroadcastHub,
};
use bridge_repository::{CommandRepository, DeviceRepository, TelemetryRepository};
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Per-group frame buffer. Commands are consumed promptly by the transport
/// loop, so a small buffer suffices.
const GROUP_CHANNEL_CAPACITY: usize = 64;

pub struct DeviceHub {
    db: DatabaseConnection,
    groups: DashMap<String, broadcast::Sender<Arc<CommandFrame>>>,
    operator_hub: Arc<OperatorHub>,
    metrics: Arc<DispatchMetrics>,
    telemetry_window: u64,
}

impl DeviceHub {
    pub fn new(
        db: DatabaseConnection,
        operator_hub: Arc<OperatorHub>,
        metrics: Arc<DispatchMetrics>,
        telemetry_window: u64,
    ) -> Self {
        Self {
            db,
            groups: DashMap::new(),
            operator_hub,
            metrics,
            telemetry_window,
        }
    }

    #[inline]
    fn group_key(device_id: &str) -> String {
        format!("device:{device_id}")
    }

    fn group_sender(&self, device_id: &str) -> broadcast::Sender<Arc<CommandFrame>> {
        self.groups
            .entry(Self::group_key(device_id))
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(GROUP_CHANNEL_CAPACITY);
                tx
            })
            .value()
            .clone()
    }

    /// Associate a live connection with the device group. Any inbound frame
    /// counts as a heartbeat, so registration refreshes last-seen.
    pub async fn register(
        &self,
        connection_id: &str,
        device_id: &str,
    ) -> BridgeResult<broadcast::Receiver<Arc<CommandFrame>>> {
        let known = DeviceRepository::find_by_id(device_id, Some(&self.db))
            .await?
            .is_some();
        if !known {
            return Err(BridgeError::StorageError(StorageError::EntityNotFound(
                format!("device {device_id}"),
            )));
        }

        DeviceRepository::touch_last_seen(device_id, false, Some(&self.db)).await?;

        let receiver = self.group_sender(device_id).subscribe();
        info!(connection_id, device_id, "device connection registered");
        Ok(receiver)
    }

    /// Deliver a command frame to every connection in the device group.
    ///
    /// Returns true iff the frame left the process; it does not wait for the
    /// device to execute anything.
    pub async fn send_command(&self, device_id: &str, command_id: &str, verb: &str) -> bool {
        let Some(sender) = self.groups.get(&Self::group_key(device_id)) else {
            debug!(device_id, command_id, "no registered connections for device");
            return false;
        };

        let frame = Arc::new(CommandFrame {
            device_id: device_id.to_string(),
            command_id: command_id.to_string(),
            verb: verb.to_string(),
        });
        match sender.send(frame) {
            Ok(receivers) => {
                debug!(device_id, command_id, receivers, "command frame sent");
                true
            }
            Err(_) => {
                debug!(device_id, command_id, "device group has no live receivers");
                false
            }
        }
    }

    /// Ingest one telemetry sample: refresh last-seen, persist with rolling
    /// pruning, notify operators.
    pub async fn handle_telemetry(&self, device_id: &str, payload: &str) -> BridgeResult<()> {
        let known = DeviceRepository::touch_last_seen(device_id, false, Some(&self.db)).await?;
        if !known {
            warn!(device_id, "telemetry from unknown device dropped");
            return Ok(());
        }

        let sample =
            TelemetryRepository::append(device_id, payload, self.telemetry_window, Some(&self.db))
                .await?;
        self.metrics.incr(&self.metrics.telemetry_ingested);

        self.operator_hub.publish(OperatorEvent::TelemetryReceived {
            sample: sample.into(),
        });
        Ok(())
    }

    /// Apply a device-reported command outcome.
    ///
    /// Unknown ids are logged and dropped. The terminal write is conditional
    /// on the row still being pending, so a repeated or raced result is a
    /// no-op and publishes nothing.
    pub async fn handle_command_result(
        &self,
        command_id: &str,
        outcome: CommandOutcome,
        result: Option<String>,
    ) -> BridgeResult<()> {
        let Some(command) = CommandRepository::find_by_id(command_id, Some(&self.db)).await? else {
            warn!(command_id, "result for unknown command dropped");
            return Ok(());
        };

        // Inbound frames double as heartbeats.
        DeviceRepository::touch_last_seen(&command.device_id, false, Some(&self.db)).await?;

        let status = CommandStatus::from(outcome);
        let latency_ms = (Utc::now() - command.created_at).num_milliseconds();
        let transitioned = CommandRepository::complete_if_pending(
            command_id,
            status,
            result.clone(),
            Some(latency_ms),
            Some(&self.db),
        )
        .await?;

        if !transitioned {
            debug!(command_id, "result for already-terminal command ignored");
            return Ok(());
        }

        match status {
            CommandStatus::Completed => self.metrics.incr(&self.metrics.commands_completed),
            _ => self.metrics.incr(&self.metrics.commands_failed),
        }

        let snapshot = CommandSnapshot {
            status,
            result,
            latency_ms: Some(latency_ms),
            ..CommandSnapshot::from(command)
        };
        info!(
            command_id,
            device_id = %snapshot.device_id,
            status = %snapshot.status,
            latency_ms,
            "command result applied"
        );
        self.operator_hub
            .publish(OperatorEvent::CommandCompleted { command: snapshot });
        Ok(())
    }
}
