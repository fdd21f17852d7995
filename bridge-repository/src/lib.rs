use bridge_common::BridgeAppContext;
use bridge_error::storage::StorageError;
use bridge_models::DbManager;
use bridge_storage::BridgeDbManager;
use sea_orm::DatabaseConnection;

pub mod command;
pub mod device;
pub mod telemetry;

pub use command::CommandRepository;
pub use device::DeviceRepository;
pub use telemetry::TelemetryRepository;

#[inline]
pub async fn get_db_connection() -> Result<DatabaseConnection, StorageError> {
    let ctx = BridgeAppContext::instance().await;
    ctx.db_manager()
        .map_err(|_| StorageError::StorageUnavailable)?
        .downcast_ref::<BridgeDbManager>()
        .ok_or(StorageError::StorageUnavailable)?
        .get_connection()
}
