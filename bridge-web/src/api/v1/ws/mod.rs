//! WebSocket endpoints: the device transport and the operator event feed.

pub mod device;
pub mod operator;

pub(super) const ROUTER_PREFIX: &str = "/ws";
