use crate::{entities::prelude::CommandModel, enums::common::CommandStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Submission payload for `POST /devices/{id}/commands`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommand {
    /// Names one logical command per device regardless of resubmissions.
    #[validate(length(min = 1, max = 200))]
    pub idempotency_key: String,
    /// Verb dispatched to the device.
    #[validate(length(min = 1, max = 100))]
    pub command: String,
}

/// Router decision for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The command exists (fresh or deduplicated) under this id.
    Accepted { command_id: String },
    /// The in-flight queue is full; nothing was persisted. The caller may
    /// retry with the same idempotency key.
    QueueFull,
}

/// Serializable view of a command row, used by the REST detail endpoint and
/// the operator `command-completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshot {
    pub id: String,
    pub device_id: String,
    pub idempotency_key: String,
    pub verb: String,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<CommandModel> for CommandSnapshot {
    fn from(m: CommandModel) -> Self {
        Self {
            id: m.id,
            device_id: m.device_id,
            idempotency_key: m.idempotency_key,
            verb: m.verb,
            status: m.status,
            result: m.result,
            latency_ms: m.latency_ms,
            created_at: m.created_at,
        }
    }
}
