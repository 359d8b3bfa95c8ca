//! End-Point-Detection engine integration.

pub mod client;
pub mod messages;

pub use client::{EpdClient, EpdClientConfig, EpdEventCallback};
pub use messages::{EpdEvent, EpdStatus};
