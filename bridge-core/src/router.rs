//! Command router: the heart of the control plane.
//!
//! A submission resolves to exactly one durable command per
//! (device, idempotency key) pair. Fresh commands reserve a slot on the
//! bounded in-flight queue before they are persisted, so a full queue
//! rejects with backpressure and leaves nothing behind, and a persisted
//! command is always the one the worker finds when its queue entry drains.
//!
//! One worker drains the queue: it gates on the device's circuit breaker,
//! applies the chaos knobs, dispatches through the retry executor and
//! schedules a response-timeout reconciliation for everything that stays
//! pending. Per-command failures are confined; the worker never dies.

use crate::{
    chaos::ChaosKnobs,
    circuit::{CircuitRegistry, CircuitState},
    hub::{DeviceHub, OperatorHub},
    retry::RetryExecutor,
};
use bridge_error::{BridgeError, BridgeResult};
use bridge_models::{
    core::metrics::DispatchMetrics,
    domain::prelude::{CommandSnapshot, OperatorEvent, SubmitOutcome},
    entities::prelude::{CommandActiveModel, CommandModel},
    enums::common::CommandStatus,
    settings::Dispatch,
    BroadcastHub,
};
use bridge_repository::CommandRepository;
use chrono::Utc;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const MAX_KEY_LEN: usize = 200;
const MAX_VERB_LEN: usize = 100;

/// Queue entry; the durable row is re-read on dequeue.
#[derive(Debug)]
pub struct QueuedCommand {
    pub id: String,
    pub device_id: String,
    pub verb: String,
}

pub struct CommandRouter {
    db: DatabaseConnection,
    queue_tx: mpsc::Sender<QueuedCommand>,
    registry: Arc<CircuitRegistry>,
    retry: RetryExecutor,
    chaos: ChaosKnobs,
    device_hub: Arc<DeviceHub>,
    operator_hub: Arc<OperatorHub>,
    metrics: Arc<DispatchMetrics>,
    response_timeout: Duration,
    shutdown: CancellationToken,
}

impl CommandRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DatabaseConnection,
        dispatch: &Dispatch,
        chaos: ChaosKnobs,
        queue_tx: mpsc::Sender<QueuedCommand>,
        registry: Arc<CircuitRegistry>,
        device_hub: Arc<DeviceHub>,
        operator_hub: Arc<OperatorHub>,
        metrics: Arc<DispatchMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            queue_tx,
            registry,
            retry: RetryExecutor::new(&dispatch.retry_base_delays_ms, dispatch.retry_jitter_ms),
            chaos,
            device_hub,
            operator_hub,
            metrics,
            response_timeout: Duration::from_millis(dispatch.response_timeout_ms),
            shutdown,
        }
    }

    /// Resolve a submission. See the module docs for the reservation order.
    #[instrument(name = "submit-command", skip(self, verb))]
    pub async fn submit(
        &self,
        device_id: &str,
        idempotency_key: &str,
        verb: &str,
    ) -> BridgeResult<SubmitOutcome> {
        validate_submission(device_id, idempotency_key, verb)?;
        self.metrics.incr(&self.metrics.commands_submitted);

        // Fast path: the pair already names a durable command.
        if let Some(existing) =
            CommandRepository::find_by_key(device_id, idempotency_key, Some(&self.db)).await?
        {
            self.metrics.incr(&self.metrics.commands_deduplicated);
            debug!(command_id = %existing.id, "submission deduplicated");
            return Ok(SubmitOutcome::Accepted {
                command_id: existing.id,
            });
        }

        // Reserve queue capacity before touching the store: a full queue is
        // a pure backpressure signal with nothing persisted to refund.
        let permit = match self.queue_tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                self.metrics.incr(&self.metrics.queue_rejections);
                warn!(device_id, "in-flight queue full, submission rejected");
                return Ok(SubmitOutcome::QueueFull);
            }
            Err(TrySendError::Closed(())) => {
                return Err(BridgeError::ShutdownError(
                    "command queue is closed".into(),
                ));
            }
        };

        let command = CommandActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            device_id: Set(device_id.to_string()),
            idempotency_key: Set(idempotency_key.to_string()),
            verb: Set(verb.to_string()),
            status: Set(CommandStatus::Pending),
            result: Set(None),
            latency_ms: Set(None),
            created_at: Set(Utc::now()),
        };

        match CommandRepository::create(command, Some(&self.db)).await {
            Ok(created) => {
                // Durable first, queued second: the worker can always
                // re-read what it dequeues.
                permit.send(QueuedCommand {
                    id: created.id.clone(),
                    device_id: created.device_id,
                    verb: created.verb,
                });
                self.metrics.enqueue();
                self.metrics.incr(&self.metrics.commands_accepted);
                Ok(SubmitOutcome::Accepted {
                    command_id: created.id,
                })
            }
            Err(bridge_error::storage::StorageError::DuplicateKey(_)) => {
                // Two submissions raced past the lookup; the constraint
                // picked the winner. Release the unused reservation and
                // answer with the surviving id.
                drop(permit);
                let existing =
                    CommandRepository::find_by_key(device_id, idempotency_key, Some(&self.db))
                        .await?
                        .ok_or_else(|| {
                            BridgeError::InvalidStateError(format!(
                                "duplicate key reported but no command found for ({device_id}, {idempotency_key})"
                            ))
                        })?;
                self.metrics.incr(&self.metrics.commands_deduplicated);
                Ok(SubmitOutcome::Accepted {
                    command_id: existing.id,
                })
            }
            Err(e) => {
                drop(permit);
                Err(e.into())
            }
        }
    }

    /// Spawn the single queue consumer.
    pub fn spawn_worker(self: &Arc<Self>, mut rx: mpsc::Receiver<QueuedCommand>) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            info!("command worker started");
            loop {
                tokio::select! {
                    _ = router.shutdown.cancelled() => break,
                    queued = rx.recv() => match queued {
                        Some(queued) => {
                            router.metrics.dequeue();
                            router.process(queued).await;
                        }
                        None => break,
                    }
                }
            }
            info!("command worker stopped");
        })
    }

    /// Handle one dequeued command end to end.
    async fn process(&self, queued: QueuedCommand) {
        // Re-read: raced duplicates and already-terminal rows are discarded
        // here instead of being tracked at enqueue time.
        let command = match CommandRepository::find_by_id(&queued.id, Some(&self.db)).await {
            Ok(Some(c)) if c.status == CommandStatus::Pending => c,
            Ok(_) => {
                debug!(command_id = %queued.id, "skipping non-pending queue entry");
                return;
            }
            Err(e) => {
                error!(command_id = %queued.id, error = %e, "failed to re-read queued command");
                return;
            }
        };

        let breaker = self.registry.get(&command.device_id);
        if breaker.state() == CircuitState::Open {
            warn!(
                command_id = %command.id,
                device_id = %command.device_id,
                "circuit open, dispatch skipped"
            );
            self.metrics.incr(&self.metrics.breaker_skips);
            self.schedule_reconciliation(command.id, "circuit open");
            return;
        }

        if self.chaos.should_drop() {
            warn!(command_id = %command.id, "chaos drop, dispatch skipped");
            self.metrics.incr(&self.metrics.chaos_drops);
            self.schedule_reconciliation(command.id, "dropped");
            return;
        }
        if let Some(delay) = self.chaos.sample_latency() {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }

        let started = Instant::now();
        self.metrics.incr(&self.metrics.commands_dispatched);
        let sent = self
            .retry
            .execute(
                || {
                    self.device_hub
                        .send_command(&command.device_id, &command.id, &command.verb)
                },
                &self.shutdown,
            )
            .await;

        match sent {
            Ok(true) => {
                breaker.record_success();
                self.schedule_reconciliation(command.id, "timeout");
            }
            Ok(false) => {
                breaker.record_failure();
                let latency_ms = started.elapsed().as_millis() as i64;
                self.fail_command(&command, "transport send failed after retries", latency_ms)
                    .await;
            }
            // Shutdown raced the retry delays; the startup scan will
            // reconcile anything left pending.
            Err(_) => {}
        }
    }

    /// Fail a still-pending command synchronously from the worker.
    async fn fail_command(&self, command: &CommandModel, reason: &str, latency_ms: i64) {
        match fail_pending(
            &self.db,
            &self.operator_hub,
            &self.metrics,
            command,
            reason,
            latency_ms,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => debug!(command_id = %command.id, "command already terminal"),
            Err(e) => error!(command_id = %command.id, error = %e, "failed to mark command failed"),
        }
    }

    /// Arrange for a pending command to be failed after the response
    /// timeout, unless a device result lands first.
    fn schedule_reconciliation(&self, command_id: String, reason: &'static str) {
        let db = self.db.clone();
        let operator_hub = Arc::clone(&self.operator_hub);
        let metrics = Arc::clone(&self.metrics);
        let timeout = self.response_timeout;
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(timeout) => {}
            }

            let command = match CommandRepository::find_by_id(&command_id, Some(&db)).await {
                Ok(Some(c)) if c.status == CommandStatus::Pending => c,
                Ok(_) => return,
                Err(e) => {
                    error!(command_id, error = %e, "reconciler failed to re-read command");
                    return;
                }
            };

            let latency_ms = (Utc::now() - command.created_at).num_milliseconds();
            if let Err(e) =
                fail_pending(&db, &operator_hub, &metrics, &command, reason, latency_ms).await
            {
                error!(command_id, error = %e, "reconciler failed to mark command failed");
            }
        });
    }

    /// Fail every pending command older than the response timeout. Runs once
    /// at startup, before the worker: reconciliation tasks do not survive a
    /// crash, the scan covers for them.
    pub async fn reconcile_stale_pending(&self) -> BridgeResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.response_timeout)
                .map_err(|e| BridgeError::InvalidStateError(e.to_string()))?;
        let stale = CommandRepository::find_stale_pending(cutoff, &self.db).await?;
        let count = stale.len();

        for command in stale {
            let latency_ms = (Utc::now() - command.created_at).num_milliseconds();
            fail_pending(
                &self.db,
                &self.operator_hub,
                &self.metrics,
                &command,
                "timeout",
                latency_ms,
            )
            .await?;
        }

        if count > 0 {
            info!(count, "reconciled stale pending commands at startup");
        }
        Ok(count)
    }
}

/// Shared pending→failed transition: conditional terminal write, counters,
/// then the `command-completed` event (published only after the durable
/// write, and only by the writer that won).
async fn fail_pending(
    db: &DatabaseConnection,
    operator_hub: &Arc<OperatorHub>,
    metrics: &Arc<DispatchMetrics>,
    command: &CommandModel,
    reason: &str,
    latency_ms: i64,
) -> BridgeResult<bool> {
    let transitioned = CommandRepository::complete_if_pending(
        &command.id,
        CommandStatus::Failed,
        Some(reason.to_string()),
        Some(latency_ms),
        Some(db),
    )
    .await?;

    if !transitioned {
        return Ok(false);
    }

    metrics.incr(&metrics.commands_failed);
    if reason == "timeout" {
        metrics.incr(&metrics.commands_timed_out);
    }
    warn!(
        command_id = %command.id,
        device_id = %command.device_id,
        reason,
        latency_ms,
        "command failed"
    );

    let snapshot = CommandSnapshot {
        status: CommandStatus::Failed,
        result: Some(reason.to_string()),
        latency_ms: Some(latency_ms),
        ..CommandSnapshot::from(command.clone())
    };
    operator_hub.publish(OperatorEvent::CommandCompleted { command: snapshot });
    Ok(true)
}

fn validate_submission(device_id: &str, idempotency_key: &str, verb: &str) -> BridgeResult<()> {
    if device_id.is_empty() {
        return Err(BridgeError::Validation("device id must not be empty".into()));
    }
    if idempotency_key.is_empty() || idempotency_key.len() > MAX_KEY_LEN {
        return Err(BridgeError::Validation(format!(
            "idempotency key must be 1..={MAX_KEY_LEN} characters"
        )));
    }
    if verb.is_empty() || verb.len() > MAX_VERB_LEN {
        return Err(BridgeError::Validation(format!(
            "command verb must be 1..={MAX_VERB_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_empty_and_oversized_inputs() {
        assert!(validate_submission("d01", "k", "Reboot").is_ok());
        assert!(validate_submission("", "k", "Reboot").is_err());
        assert!(validate_submission("d01", "", "Reboot").is_err());
        assert!(validate_submission("d01", "k", "").is_err());
        assert!(validate_submission("d01", &"k".repeat(200), "Reboot").is_ok());
        assert!(validate_submission("d01", &"k".repeat(201), "Reboot").is_err());
        assert!(validate_submission("d01", "k", &"v".repeat(100)).is_ok());
        assert!(validate_submission("d01", "k", &"v".repeat(101)).is_err());
    }
}
