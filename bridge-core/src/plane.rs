//! Control-plane assembly: wires the router, hubs, breaker registry and
//! liveness monitor together and owns their task lifecycles.

use crate::{
    chaos::ChaosKnobs,
    circuit::CircuitRegistry,
    hub::{DeviceHub, OperatorHub},
    monitor::LivenessMonitor,
    router::{CommandRouter, QueuedCommand},
};
use async_trait::async_trait;
use bridge_error::{init::InitContextError, BridgeResult};
use bridge_models::{
    core::metrics::DispatchMetrics,
    domain::prelude::{CommandFrame, CommandOutcome, SubmitOutcome},
    settings::Settings,
    BroadcastHub, CommandDispatch, ControlPlane, DbManager, DeviceIngress,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub struct BridgeControlPlane {
    #[allow(unused)]
    db: DatabaseConnection,
    router: Arc<CommandRouter>,
    device_hub: Arc<DeviceHub>,
    operator_hub: Arc<OperatorHub>,
    metrics: Arc<DispatchMetrics>,
    started_at: DateTime<Utc>,
    worker_task: RwLock<Option<JoinHandle<()>>>,
    monitor_task: RwLock<Option<JoinHandle<()>>>,
    shutdown_token: CancellationToken,
}

impl BridgeControlPlane {
    /// Operator event-fanout capacity. Sized for bursts (a busy sweep plus
    /// command completions), not sustained backlog: laggards skip.
    const OPERATOR_CHANNEL_CAPACITY: usize = 1024;

    /// When the control plane started, for uptime reporting.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[async_trait]
impl ControlPlane for BridgeControlPlane {
    #[instrument(name = "control-plane-init", skip_all)]
    async fn init(
        settings: &Settings,
        db_manager: Arc<dyn DbManager>,
    ) -> BridgeResult<Arc<Self>, InitContextError> {
        let db = db_manager.get_connection().map_err(|e| {
            InitContextError::Primitive(format!("Failed to get database connection: {e}"))
        })?;

        let metrics = Arc::new(DispatchMetrics::default());
        let operator_hub = Arc::new(OperatorHub::new(Self::OPERATOR_CHANNEL_CAPACITY));
        let device_hub = Arc::new(DeviceHub::new(
            db.clone(),
            Arc::clone(&operator_hub),
            Arc::clone(&metrics),
            settings.telemetry.window,
        ));
        let registry = Arc::new(CircuitRegistry::new(
            settings.dispatch.breaker_failure_threshold,
            Duration::from_millis(settings.dispatch.breaker_open_ms),
        ));
        let chaos = ChaosKnobs::from_settings(&settings.chaos);
        if chaos.is_active() {
            warn!("chaos knobs are active: dispatches may be delayed or dropped");
        }

        let shutdown_token = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel::<QueuedCommand>(settings.dispatch.queue_capacity);

        let router = Arc::new(CommandRouter::new(
            db.clone(),
            &settings.dispatch,
            chaos,
            queue_tx,
            registry,
            Arc::clone(&device_hub),
            Arc::clone(&operator_hub),
            Arc::clone(&metrics),
            shutdown_token.clone(),
        ));

        // Reconciliation tasks do not survive a restart; fail anything that
        // outlived its response timeout before the worker starts draining.
        router.reconcile_stale_pending().await.map_err(|e| {
            InitContextError::Primitive(format!("Startup reconciliation scan failed: {e}"))
        })?;

        let worker_task = router.spawn_worker(queue_rx);

        let monitor_task = LivenessMonitor::new(
            db.clone(),
            Arc::clone(&operator_hub),
            &settings.liveness,
            shutdown_token.clone(),
        )
        .spawn();

        info!("control plane initialized");
        Ok(Arc::new(Self {
            db,
            router,
            device_hub,
            operator_hub,
            metrics,
            started_at: Utc::now(),
            worker_task: RwLock::new(Some(worker_task)),
            monitor_task: RwLock::new(Some(monitor_task)),
            shutdown_token,
        }))
    }

    #[instrument(name = "control-plane-stop", skip_all)]
    async fn stop(&self) -> BridgeResult<()> {
        info!("🛑 Stopping control plane...");
        self.shutdown_token.cancel();

        if let Some(handle) = self.worker_task.write().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.monitor_task.write().await.take() {
            let _ = handle.await;
        }

        info!("✅ Control plane stopped successfully");
        Ok(())
    }

    fn broadcast_hub(&self) -> Arc<dyn BroadcastHub> {
        Arc::clone(&self.operator_hub) as Arc<dyn BroadcastHub>
    }

    fn dispatch_metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl CommandDispatch for BridgeControlPlane {
    async fn submit_command(
        &self,
        device_id: &str,
        idempotency_key: &str,
        verb: &str,
    ) -> BridgeResult<SubmitOutcome> {
        self.router.submit(device_id, idempotency_key, verb).await
    }
}

#[async_trait]
impl DeviceIngress for BridgeControlPlane {
    async fn register_device(
        &self,
        connection_id: &str,
        device_id: &str,
    ) -> BridgeResult<broadcast::Receiver<Arc<CommandFrame>>> {
        self.device_hub.register(connection_id, device_id).await
    }

    async fn ingest_telemetry(&self, device_id: &str, payload: &str) -> BridgeResult<()> {
        self.device_hub.handle_telemetry(device_id, payload).await
    }

    async fn ingest_command_result(
        &self,
        command_id: &str,
        outcome: CommandOutcome,
        result: Option<String>,
    ) -> BridgeResult<()> {
        self.device_hub
            .handle_command_result(command_id, outcome, result)
            .await
    }
}
