//! Viewer-facing broadcast gateway.
//!
//! - `protocol`: inbound commands and outbound frames.
//! - `room`: broadcast groups and per-connection subscriptions.
//! - `broadcast`: `BroadcastGateway`, the connection registry and fan-out.

pub mod broadcast;
pub mod protocol;
pub mod room;

pub use broadcast::*;
pub use protocol::*;
pub use room::*;
