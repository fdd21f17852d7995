use crate::{
    entities::prelude::{DeviceModel, TelemetryModel},
    enums::common::{DeviceKind, DeviceStatus},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query parameters for the keyset-paginated device listing.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DevicePageParams {
    pub status: Option<DeviceStatus>,
    pub kind: Option<DeviceKind>,
    /// Case-sensitive name substring filter.
    #[validate(length(max = 120))]
    pub name: Option<String>,
    /// Exclusive id cursor: items strictly after this id are returned.
    #[validate(length(max = 64))]
    pub after: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u64>,
}

/// Detail view: the device row plus its recent telemetry window and the
/// optimistic-concurrency token callers must echo back on update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    pub device: DeviceModel,
    pub telemetry: Vec<TelemetryModel>,
    pub version: i32,
}

/// Mutable device fields exposed on the update path.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDevice {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 64))]
    pub firmware: Option<String>,
    /// Concurrency token; a stale value yields a conflict.
    pub version: i32,
}
