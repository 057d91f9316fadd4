//! Real-time chat gateway: wire protocol, connection registry, and the
//! per-connection WebSocket state machine.

pub mod events;
pub mod registry;
pub mod server;
