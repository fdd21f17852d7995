use sea_orm::{DeriveActiveEnum, EnumIter};
use sea_query::StringLen;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Device category tag.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[sea_orm(string_value = "display")]
    Display,
    #[sea_orm(string_value = "codec")]
    Codec,
    #[sea_orm(string_value = "switcher")]
    Switcher,
    #[sea_orm(string_value = "sensor")]
    Sensor,
}

/// Transport a device speaks on its edge link.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[sea_orm(string_value = "line-oriented-tcp")]
    LineOrientedTcp,
    #[sea_orm(string_value = "http-json")]
    HttpJson,
    #[sea_orm(string_value = "edge-push")]
    EdgePush,
}

/// Reachability status maintained by the liveness monitor.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Command lifecycle status. Once `Completed` or `Failed` the row is terminal
/// and its result fields never change.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CommandStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }
}

impl Display for CommandStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Completed => write!(f, "completed"),
            CommandStatus::Failed => write!(f, "failed"),
        }
    }
}
