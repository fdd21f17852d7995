#![allow(dead_code)]

use async_trait::async_trait;
use bridge_core::BridgeControlPlane;
use bridge_error::{init::InitContextError, storage::StorageError, BridgeResult};
use bridge_models::{
    domain::prelude::OperatorEvent,
    entities::prelude::{CapabilitySet, DeviceActiveModel},
    enums::common::{DeviceKind, DeviceStatus, TransportKind},
    settings::{Chaos, Dispatch, Inner, Liveness, Settings, Telemetry},
    ControlPlane, DbManager,
};
use bridge_storage::BridgeMigrator;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectOptions, Database, DatabaseConnection,
};
use sea_orm_migration::MigratorTrait;
use std::sync::{Arc, Once};
use tokio::sync::broadcast;
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// In-memory database manager for driving the control plane in tests.
///
/// A single pooled connection keeps every query on the same `:memory:`
/// database.
pub struct TestDbManager {
    conn: DatabaseConnection,
}

impl TestDbManager {
    pub async fn new() -> Arc<Self> {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1);
        let conn = Database::connect(opts)
            .await
            .expect("failed to open in-memory database");
        BridgeMigrator::up(&conn, None)
            .await
            .expect("failed to migrate in-memory database");
        Arc::new(Self { conn })
    }
}

#[async_trait]
impl DbManager for TestDbManager {
    async fn init(_settings: &Settings) -> BridgeResult<Arc<Self>, InitContextError> {
        Ok(Self::new().await)
    }

    fn get_connection(&self) -> BridgeResult<DatabaseConnection, StorageError> {
        Ok(self.conn.clone())
    }

    async fn close(&self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Fast-turnaround settings: same structure as production, shrunk timings so
/// retries, timeouts and sweeps resolve within a test budget.
pub fn test_settings() -> Settings {
    test_settings_with(|_| {})
}

pub fn test_settings_with(mutate: impl FnOnce(&mut Inner)) -> Settings {
    let mut inner = Inner {
        dispatch: Dispatch {
            queue_capacity: 50,
            response_timeout_ms: 400,
            retry_base_delays_ms: vec![10, 20, 30],
            retry_jitter_ms: 5,
            breaker_failure_threshold: 5,
            breaker_open_ms: 10_000,
        },
        liveness: Liveness {
            sweep_interval_ms: 100,
            offline_after_ms: 30_000,
        },
        telemetry: Telemetry { window: 50 },
        chaos: Chaos::default(),
        ..Default::default()
    };
    mutate(&mut inner);
    Settings::from_inner(inner)
}

pub async fn start_control_plane(
    settings: &Settings,
) -> (Arc<BridgeControlPlane>, DatabaseConnection) {
    init_tracing();
    let db_manager = TestDbManager::new().await;
    let conn = db_manager.get_connection().unwrap();
    let plane = BridgeControlPlane::init(settings, db_manager)
        .await
        .expect("control plane init failed");
    (plane, conn)
}

pub async fn seed_device(
    conn: &DatabaseConnection,
    id: &str,
    status: DeviceStatus,
    last_seen: Option<DateTime<Utc>>,
) {
    DeviceActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("Device {id}")),
        kind: Set(DeviceKind::Display),
        transport: Set(TransportKind::EdgePush),
        capabilities: Set(CapabilitySet(vec!["power".into()])),
        status: Set(status),
        last_seen: Set(last_seen),
        firmware: Set("1.0.0".into()),
        location: Set("rack-1".into()),
        version: Set(0),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(None),
    }
    .insert(conn)
    .await
    .expect("failed to seed device");
}

/// Wait for the `command-completed` event of a specific command id.
pub async fn await_command_completed(
    rx: &mut broadcast::Receiver<Arc<OperatorEvent>>,
    command_id: &str,
    budget: std::time::Duration,
) -> bridge_models::domain::prelude::CommandSnapshot {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("timed out waiting for command-completed event");
        let event = tokio::time::timeout(remaining, rx.recv())
            .await
            .expect("timed out waiting for command-completed event")
            .expect("operator event channel closed");
        if let OperatorEvent::CommandCompleted { command } = event.as_ref() {
            if command.id == command_id {
                return command.clone();
            }
        }
    }
}
