//! Wire-level payloads shared by the device transport, the operator feed and
//! the hubs that carry them.

use crate::{
    domain::prelude::CommandSnapshot, entities::prelude::TelemetryModel,
    enums::common::{CommandStatus, DeviceStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Command frame delivered to every live connection in a device group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    pub device_id: String,
    pub command_id: String,
    pub verb: String,
}

/// Terminal outcome a device reports for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Completed,
    Failed,
}

impl From<CommandOutcome> for CommandStatus {
    fn from(o: CommandOutcome) -> Self {
        match o {
            CommandOutcome::Completed => CommandStatus::Completed,
            CommandOutcome::Failed => CommandStatus::Failed,
        }
    }
}

/// One retained telemetry sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub id: String,
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub payload: String,
}

impl From<TelemetryModel> for TelemetrySample {
    fn from(m: TelemetryModel) -> Self {
        Self {
            id: m.id,
            device_id: m.device_id,
            ts: m.ts,
            payload: m.payload,
        }
    }
}

/// Event fanned out to every connected operator session. Each variant carries
/// everything a consumer needs to stand alone; no inter-event ordering is
/// guaranteed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperatorEvent {
    DeviceStatusChanged {
        device_id: String,
        status: DeviceStatus,
    },
    CommandCompleted {
        command: CommandSnapshot,
    },
    TelemetryReceived {
        sample: TelemetrySample,
    },
}
