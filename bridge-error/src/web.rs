use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::{storage::StorageError, BridgeError};

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("BadRequest: `{0}`")]
    BadRequest(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("TooManyRequests: `{0}`")]
    TooManyRequests(String),
    #[error("Conflict: `{0}`")]
    Conflict(String),
    #[error("InternalError: `{0}`")]
    InternalError(String),
    #[error("DBError: `{0}`")]
    StorageError(#[from] StorageError),
}

impl From<std::io::Error> for WebError {
    fn from(e: std::io::Error) -> Self {
        WebError::InternalError(e.to_string())
    }
}

impl From<BridgeError> for WebError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::StorageError(StorageError::EntityNotFound(msg)) => WebError::NotFound(msg),
            BridgeError::StorageError(StorageError::VersionConflict(msg)) => {
                WebError::Conflict(msg)
            }
            BridgeError::Validation(msg) => WebError::BadRequest(msg),
            BridgeError::Timeout(dur) => {
                WebError::BadRequest(format!("Timeout: {} ms", dur.as_millis()))
            }
            other => WebError::InternalError(other.to_string()),
        }
    }
}

impl ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "message": self.to_string()
        });
        match self {
            WebError::Unauthorized => {
                body["error"] = json!("Unauthorized");
                HttpResponse::Unauthorized().json(body)
            }
            WebError::BadRequest(_) => {
                body["error"] = json!("Bad Request");
                HttpResponse::BadRequest().json(body)
            }
            WebError::NotFound(_) => {
                body["error"] = json!("Not Found");
                HttpResponse::NotFound().json(body)
            }
            WebError::TooManyRequests(_) => {
                body["error"] = json!("Too Many Requests");
                HttpResponse::TooManyRequests().json(body)
            }
            WebError::Conflict(_) => {
                body["error"] = json!("Conflict");
                HttpResponse::Conflict().json(body)
            }
            WebError::InternalError(_) => {
                body["error"] = json!("Internal Server Error");
                HttpResponse::InternalServerError().json(body)
            }
            WebError::StorageError(StorageError::EntityNotFound(_)) => {
                body["error"] = json!("Not Found");
                HttpResponse::NotFound().json(body)
            }
            WebError::StorageError(StorageError::VersionConflict(_)) => {
                body["error"] = json!("Conflict");
                HttpResponse::Conflict().json(body)
            }
            WebError::StorageError(_) => {
                body["error"] = json!("Storage Error");
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}
