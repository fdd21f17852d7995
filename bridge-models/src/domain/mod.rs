pub mod command;
pub mod common;
pub mod device;
pub mod prelude;
pub mod realtime;
