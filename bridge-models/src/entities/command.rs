//! `SeaORM` Entity for dispatched commands.
//!
//! The unique index on `(device_id, idempotency_key)` is the authoritative
//! deduplication mechanism: one logical command exists per pair no matter how
//! many times it is submitted.

use crate::enums::common::CommandStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commands")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Fresh UUID assigned at creation time.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub device_id: String,
    pub idempotency_key: String,
    pub verb: String,
    pub status: CommandStatus,
    /// Device-reported result or failure reason; set exactly once.
    pub result: Option<String>,
    /// Milliseconds from creation (or dispatch start) to the terminal write.
    pub latency_ms: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
