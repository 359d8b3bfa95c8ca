//! Client-facing WebSocket transport adapter.

pub mod handler;
pub mod messages;
pub mod processor;
pub mod state;

pub use handler::ws_gateway_handler;
