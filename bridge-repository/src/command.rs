use crate::get_db_connection;
use bridge_error::{storage::StorageError, StorageResult};
use bridge_models::{
    entities::prelude::{Command, CommandActiveModel, CommandColumn, CommandModel},
    enums::common::CommandStatus,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    SqlErr,
};

/// Repository for command operations.
///
/// The unique index on (device_id, idempotency_key) backs the idempotency
/// contract; `complete_if_pending` backs the at-most-one-terminal rule.
pub struct CommandRepository;

impl CommandRepository {
    /// Insert a fresh pending command. A unique-index collision (two
    /// submissions of the same key racing past the lookup) surfaces as
    /// `StorageError::DuplicateKey` for the caller to reconcile.
    pub async fn create<C>(
        command: CommandActiveModel,
        db: Option<&C>,
    ) -> StorageResult<CommandModel>
    where
        C: ConnectionTrait,
    {
        let map_unique = |e: sea_orm::DbErr| {
            if let Some(SqlErr::UniqueConstraintViolation(msg)) = e.sql_err() {
                StorageError::DuplicateKey(msg)
            } else {
                StorageError::DBError(e)
            }
        };
        match db {
            Some(conn) => command.insert(conn).await.map_err(map_unique),
            None => {
                let conn = get_db_connection().await?;
                command.insert(&conn).await.map_err(map_unique)
            }
        }
    }

    /// Find command by ID
    pub async fn find_by_id<C>(id: &str, db: Option<&C>) -> StorageResult<Option<CommandModel>>
    where
        C: ConnectionTrait,
    {
        match db {
            Some(conn) => Ok(Command::find_by_id(id).one(conn).await?),
            None => {
                let conn = get_db_connection().await?;
                Ok(Command::find_by_id(id).one(&conn).await?)
            }
        }
    }

    /// Find the command owning a (device, idempotency key) pair
    pub async fn find_by_key<C>(
        device_id: &str,
        idempotency_key: &str,
        db: Option<&C>,
    ) -> StorageResult<Option<CommandModel>>
    where
        C: ConnectionTrait,
    {
        let query = Command::find()
            .filter(CommandColumn::DeviceId.eq(device_id))
            .filter(CommandColumn::IdempotencyKey.eq(idempotency_key));
        match db {
            Some(conn) => Ok(query.one(conn).await?),
            None => {
                let conn = get_db_connection().await?;
                Ok(query.one(&conn).await?)
            }
        }
    }

    /// Transition a command out of pending exactly once.
    ///
    /// The update is guarded on `status = pending`, so whichever writer gets
    /// here first wins; later writers affect zero rows and get `false` back.
    /// Terminal fields are therefore written at most once.
    pub async fn complete_if_pending<C>(
        id: &str,
        status: CommandStatus,
        result: Option<String>,
        latency_ms: Option<i64>,
        db: Option<&C>,
    ) -> StorageResult<bool>
    where
        C: ConnectionTrait,
    {
        let update = Command::update_many()
            .col_expr(CommandColumn::Status, Expr::value(status))
            .col_expr(CommandColumn::Result, Expr::value(result))
            .col_expr(CommandColumn::LatencyMs, Expr::value(latency_ms))
            .filter(CommandColumn::Id.eq(id))
            .filter(CommandColumn::Status.eq(CommandStatus::Pending));
        let res = match db {
            Some(conn) => update.exec(conn).await?,
            None => {
                let conn = get_db_connection().await?;
                update.exec(&conn).await?
            }
        };
        Ok(res.rows_affected > 0)
    }

    /// Pending commands created before the cutoff. Used by the startup scan
    /// to reconcile reconciliation tasks lost in a crash.
    pub async fn find_stale_pending<C>(
        cutoff: DateTime<Utc>,
        db: &C,
    ) -> StorageResult<Vec<CommandModel>>
    where
        C: ConnectionTrait,
    {
        Ok(Command::find()
            .filter(CommandColumn::Status.eq(CommandStatus::Pending))
            .filter(CommandColumn::CreatedAt.lt(cutoff))
            .all(db)
            .await?)
    }
}
