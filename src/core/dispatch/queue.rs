//! Global STT work queue.
//!
//! Multi-producer (one per session event path), consumed by the batch
//! dispatcher tick and by per-session drain flushes. Items are immutable
//! snapshots of segmentation state; the PCM itself is resolved from the
//! session buffer at dispatch time.

use std::collections::VecDeque;

use parking_lot::Mutex;
use uuid::Uuid;

/// One enqueued recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub session_id: Uuid,
    /// Per-session sequence number assigned at enqueue.
    pub sequence: u64,
    pub start: u64,
    pub end: u64,
    pub is_final: bool,
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: WorkItem) {
        self.items.lock().push_back(item);
    }

    /// Atomically remove and return up to `max` items from the front.
    pub fn splice(&self, max: usize) -> Vec<WorkItem> {
        let mut items = self.items.lock();
        let take = max.min(items.len());
        items.drain(..take).collect()
    }

    /// Atomically remove up to `max` items belonging to one session,
    /// preserving queue order for everything else.
    pub fn take_session(&self, session_id: &Uuid, max: usize) -> Vec<WorkItem> {
        let mut items = self.items.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(items.len());
        for item in items.drain(..) {
            if taken.len() < max && item.session_id == *session_id {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        *items = kept;
        taken
    }

    /// Drop all items for a session. Used by cleanup.
    pub fn purge_session(&self, session_id: &Uuid) {
        self.items.lock().retain(|item| item.session_id != *session_id);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
