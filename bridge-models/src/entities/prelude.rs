pub use super::command::{
    ActiveModel as CommandActiveModel, Column as CommandColumn, Entity as Command,
    Model as CommandModel,
};
pub use super::device::{
    ActiveModel as DeviceActiveModel, CapabilitySet, Column as DeviceColumn, Entity as Device,
    Model as DeviceModel,
};
pub use super::telemetry::{
    ActiveModel as TelemetryActiveModel, Column as TelemetryColumn, Entity as Telemetry,
    Model as TelemetryModel,
};
