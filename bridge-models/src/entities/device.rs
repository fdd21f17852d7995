//! `SeaORM` Entity for the device registry table.

use crate::enums::common::{DeviceKind, DeviceStatus, TransportKind};
use sea_orm::{entity::prelude::*, FromJsonQueryResult};
use serde::{Deserialize, Serialize};

/// Capability names advertised by a device, stored as a JSON string array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CapabilitySet(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Opaque device id, stable across restarts (assigned by provisioning).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub kind: DeviceKind,
    pub transport: TransportKind,
    #[sea_orm(column_type = "Json")]
    pub capabilities: CapabilitySet,
    pub status: DeviceStatus,
    /// Refreshed by any inbound frame or an explicit heartbeat.
    pub last_seen: Option<DateTimeUtc>,
    pub firmware: String,
    pub location: String,
    /// Optimistic-concurrency token, bumped on every update.
    pub version: i32,
    pub created_at: Option<DateTimeUtc>,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
