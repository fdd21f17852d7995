pub mod constants;
pub mod core;
pub mod domain;
pub mod entities;
pub mod enums;
pub mod event;
pub mod settings;
pub mod web;

use crate::{
    core::metrics::DispatchMetrics,
    domain::prelude::{CommandFrame, CommandOutcome, OperatorEvent, SubmitOutcome},
    event::BridgeEvent,
};
use async_trait::async_trait;
use bridge_error::{init::InitContextError, storage::StorageError, BridgeResult};
use downcast_rs::{impl_downcast, DowncastSync};
use sea_orm::DatabaseConnection;
use settings::Settings;
use std::sync::Arc;
use tokio::sync::broadcast;

// Implement downcast for core system traits
impl_downcast!(sync WebServer);
impl_downcast!(sync DbManager);
impl_downcast!(sync EventBus);
impl_downcast!(sync ControlPlane);
impl_downcast!(sync CommandDispatch);
impl_downcast!(sync DeviceIngress);
impl_downcast!(sync BroadcastHub);

/// Database management interface for the control plane.
///
/// Defines the core database operations: initialization, connection
/// checkout and cleanup.
#[async_trait]
pub trait DbManager: DowncastSync + Send + Sync + 'static {
    /// Initializes the database manager with the provided settings.
    async fn init(settings: &Settings) -> BridgeResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Retrieves a database connection from the connection pool.
    fn get_connection(&self) -> BridgeResult<DatabaseConnection, StorageError>;

    /// Gracefully closes all database connections.
    async fn close(&self) -> BridgeResult<()>;
}

/// Event bus interface for process-wide lifecycle events.
#[async_trait]
pub trait EventBus: DowncastSync + Send + Sync + 'static {
    /// Initializes a new event bus instance.
    async fn init(settings: &Settings) -> Arc<Self>
    where
        Self: Sized;

    /// Registers an event handler for a specific event type.
    async fn register_handler<E, F>(&self, handler: F)
    where
        Self: Sized,
        E: BridgeEvent + 'static,
        F: FnMut(&E) -> BridgeResult<()> + Send + Sync + 'static;

    /// Publishes an event to all registered handlers.
    ///
    /// # Returns
    /// The number of subscribers that received the event
    async fn publish<E>(&self, event: E) -> BridgeResult<usize>
    where
        Self: Sized,
        E: BridgeEvent + 'static;
}

/// Web server interface for the HTTP/WebSocket surfaces.
#[async_trait]
pub trait WebServer: DowncastSync + Send + Sync + 'static {
    /// Initializes and starts the web server.
    async fn init(
        settings: &Settings,
        control_plane: Arc<dyn ControlPlane>,
    ) -> BridgeResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Gracefully stops the web server.
    async fn stop(&self) -> BridgeResult<()>;
}

/// Submission surface of the command router.
#[async_trait]
pub trait CommandDispatch: DowncastSync + Send + Sync + 'static {
    /// Resolve a submission to exactly one durable command per
    /// (device, idempotency key) pair, or signal backpressure.
    async fn submit_command(
        &self,
        device_id: &str,
        idempotency_key: &str,
        verb: &str,
    ) -> BridgeResult<SubmitOutcome>;
}

/// Inbound surface of the device connection hub.
#[async_trait]
pub trait DeviceIngress: DowncastSync + Send + Sync + 'static {
    /// Associate a live connection with the device group and start receiving
    /// command frames for it. Refreshes the device's last-seen mark.
    async fn register_device(
        &self,
        connection_id: &str,
        device_id: &str,
    ) -> BridgeResult<broadcast::Receiver<Arc<CommandFrame>>>;

    /// Ingest one telemetry sample: refresh last-seen, persist with rolling
    /// pruning, notify operators.
    async fn ingest_telemetry(&self, device_id: &str, payload: &str) -> BridgeResult<()>;

    /// Apply a device-reported command outcome. Unknown command ids are
    /// logged and dropped; repeated results for the same command are no-ops.
    async fn ingest_command_result(
        &self,
        command_id: &str,
        outcome: CommandOutcome,
        result: Option<String>,
    ) -> BridgeResult<()>;
}

/// Fan-out hub for operator sessions.
pub trait BroadcastHub: DowncastSync + Send + Sync + 'static {
    /// Subscribe the calling session to all future operator events.
    fn subscribe(&self) -> broadcast::Receiver<Arc<OperatorEvent>>;

    /// Best-effort publish; slow subscribers are skipped, publishers never
    /// block.
    fn publish(&self, event: OperatorEvent);
}

/// The assembled command-dispatch and device-liveness engine.
#[async_trait]
pub trait ControlPlane:
    DowncastSync + CommandDispatch + DeviceIngress + Send + Sync + 'static
{
    /// Initialize the control plane from settings.
    async fn init(
        settings: &Settings,
        db_manager: Arc<dyn DbManager>,
    ) -> BridgeResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Stop the worker, monitor and reconciliation tasks.
    async fn stop(&self) -> BridgeResult<()>;

    /// Operator event hub.
    fn broadcast_hub(&self) -> Arc<dyn BroadcastHub>;

    /// Process-wide dispatch counters.
    fn dispatch_metrics(&self) -> Arc<DispatchMetrics>;
}
