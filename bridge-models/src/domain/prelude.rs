pub use super::command::{CommandSnapshot, SubmitCommand, SubmitOutcome};
pub use super::common::{CursorPage, PathId};
pub use super::device::{DeviceDetail, DevicePageParams, UpdateDevice};
pub use super::realtime::{CommandFrame, CommandOutcome, OperatorEvent, TelemetrySample};
