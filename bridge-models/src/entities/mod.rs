pub mod command;
pub mod device;
pub mod prelude;
pub mod telemetry;
