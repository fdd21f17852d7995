use thiserror::Error;

#[derive(Error, Debug, Default)]
pub enum StorageError {
    #[error("database unavailable")]
    #[default]
    StorageUnavailable,

    #[error("database error: `{0}`")]
    DBError(#[from] sea_orm::DbErr),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Unique-index collision on (device_id, idempotency_key). Callers treat
    /// this as idempotent success by re-reading the existing row.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Optimistic-concurrency conflict: the row changed under the caller.
    #[error("version conflict: {0}")]
    VersionConflict(String),
}
