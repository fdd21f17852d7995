pub mod init;
pub mod storage;
pub mod web;

use anyhow::Error as AnyhowError;
use config::ConfigError;
use init::InitContextError;
use sea_orm::DbErr;
use serde_json::Error as SerdeJsonError;
use std::{error::Error as StdError, io::Error as IoError};
use storage::StorageError;
use thiserror::Error;
use tokio::{task::JoinError, time::Duration};
use web::WebError;

pub type BridgeResult<T, E = BridgeError> = anyhow::Result<T, E>;
pub type WebResult<T, E = WebError> = anyhow::Result<T, E>;
pub type StorageResult<T, E = StorageError> = Result<T, E>;

#[derive(Error, Debug, Default)]
pub enum BridgeError {
    #[error("service unavailable")]
    #[default]
    ServiceUnavailable,
    #[error("read/write timeout")]
    Timeout(Duration),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    StdError(#[from] Box<dyn StdError + Send + Sync>),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    StorageError(#[from] StorageError),
    #[error("{0}")]
    InitContextError(#[from] InitContextError),
    #[error("{0}")]
    WebError(#[from] WebError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("initialization error: {0}")]
    InitializationError(String),
    #[error("shutdown error: {0}")]
    ShutdownError(String),
    #[error("invalid state: {0}")]
    InvalidStateError(String),
}

impl From<String> for BridgeError {
    #[inline]
    fn from(e: String) -> Self {
        BridgeError::Msg(e)
    }
}

impl From<&str> for BridgeError {
    #[inline]
    fn from(e: &str) -> Self {
        BridgeError::Msg(e.to_string())
    }
}

impl From<DbErr> for BridgeError {
    #[inline]
    fn from(e: DbErr) -> Self {
        BridgeError::StorageError(StorageError::DBError(e))
    }
}
