mod migration;
mod sql;

use async_trait::async_trait;
use bridge_error::{init::InitContextError, storage::StorageError, BridgeResult};
use bridge_models::{settings::Settings, DbManager};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use sql::sqlite;
use std::sync::Arc;
use tracing::{info, instrument};

pub use migration::Migrator as BridgeMigrator;

/// Global database manager struct
pub struct BridgeDbManager {
    db_conn: Option<DatabaseConnection>,
}

#[async_trait]
impl DbManager for BridgeDbManager {
    #[inline]
    #[instrument(name = "init-db-manager", skip_all)]
    async fn init(settings: &Settings) -> BridgeResult<Arc<Self>, InitContextError> {
        let db_conn = {
            let db = sqlite::init_db(&settings.db.sqlite).await.map_err(|e| {
                InitContextError::Primitive(format!("Failed to init SQLite database: {e}"))
            })?;

            // Run database migrations
            Migrator::up(&db, None).await.map_err(|e| {
                InitContextError::Primitive(format!("Failed to migrate SQLite database: {e}"))
            })?;

            db
        };

        let db_manager = Arc::new(BridgeDbManager {
            db_conn: Some(db_conn),
        });

        info!("Database manager initialized successfully");
        Ok(db_manager)
    }

    #[inline]
    fn get_connection(&self) -> BridgeResult<DatabaseConnection, StorageError> {
        self.db_conn
            .as_ref()
            .ok_or(StorageError::StorageUnavailable)
            .cloned()
    }

    #[inline]
    #[instrument(name = "db-close", skip_all)]
    async fn close(&self) -> BridgeResult<()> {
        info!("🛑 Closing database connections...");
        if let Some(db) = &self.db_conn {
            db.clone().close().await?;
        }
        info!("✅ Database connections closed successfully");
        Ok(())
    }
}
