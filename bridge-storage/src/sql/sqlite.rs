use bridge_error::BridgeResult;
use bridge_models::settings::Sqlite;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::{info, instrument, log::LevelFilter};

/// Initialize the SQLite connection pool.
///
/// With `auto_create` enabled the URL carries `mode=rwc`, so a missing
/// database file is created on first connect.
#[instrument(name = "init_sqlite_db", skip_all)]
pub async fn init_db(config: &Sqlite) -> BridgeResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new(config.to_url());
    opts.connect_timeout(Duration::from_millis(config.timeout))
        .idle_timeout(Duration::from_millis(config.idle_timeout))
        .max_lifetime(Duration::from_millis(config.max_lifetime))
        .max_connections(config.max_connections)
        .sqlx_logging(cfg!(debug_assertions))
        .sqlx_logging_level(LevelFilter::Info);

    info!(
        path = config.db_path(),
        auto_create = config.auto_create,
        "Connecting to SQLite database"
    );

    let db = Database::connect(opts).await?;

    // Performance-oriented PRAGMA settings for release builds. WAL stays off
    // to remain safe on NFS / network filesystems.
    #[cfg(not(debug_assertions))]
    {
        use sea_orm::{ConnectionTrait, DbBackend, Statement};
        for pragma in [
            "PRAGMA synchronous=NORMAL;",
            "PRAGMA temp_store=MEMORY;",
            "PRAGMA cache_size=-20000;",
        ] {
            let _ = db
                .execute(Statement::from_string(DbBackend::Sqlite, pragma.to_string()))
                .await;
        }
    }

    info!("Successfully connected to SQLite database");
    Ok(db)
}
