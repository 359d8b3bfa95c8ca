//! Global recognition work queue and batch dispatch.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::{BatchDispatcher, BATCH_SIZE};
pub use queue::{WorkItem, WorkQueue};
