pub mod device;
pub mod operator;

pub use device::DeviceHub;
pub use operator::OperatorHub;
