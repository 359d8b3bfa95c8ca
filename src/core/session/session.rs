//! Session entity and registry.
//!
//! A session is one client turn: its audio buffer, segmentation state,
//! sequence counter, reorder buffer and stats live behind a single async
//! mutex so that chunk ingress, EPD events, dispatch reads and drain steps
//! never interleave on the same session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::core::audio::RingBuffer;
use crate::core::stt::Utterance;

use super::delivery::Reassembler;
use super::segmenter::Segmenter;

/// Outbound notifications for the client owning a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TurnReady {
        session_id: Uuid,
    },
    Delivery {
        session_id: Uuid,
        utterance: Utterance,
        is_final: bool,
    },
    DeliveryEnd {
        session_id: Uuid,
    },
}

/// Write-only handle to the originating client.
pub type EventSink = mpsc::Sender<SessionEvent>;

/// Running tally of completed STT calls for one session.
#[derive(Debug, Default, Clone, Copy)]
pub struct SttStats {
    pub total_ms: u64,
    pub count: u64,
}

impl SttStats {
    pub fn record(&mut self, elapsed_ms: u64) {
        self.total_ms += elapsed_ms;
        self.count += 1;
    }

    pub fn average_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ms / self.count
        }
    }
}

/// Mutable per-session state; guarded by [`Session::inner`].
#[derive(Debug)]
pub struct SessionInner {
    pub buffer: RingBuffer,
    pub segmenter: Segmenter,
    /// Next sequence number to assign at enqueue. Monotone.
    pub next_seq: u64,
    pub reassembler: Reassembler,
    pub stats: SttStats,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            buffer: RingBuffer::new(),
            segmenter: Segmenter::new(),
            next_seq: 0,
            reassembler: Reassembler::new(),
            stats: SttStats::default(),
        }
    }
}

pub struct Session {
    pub id: Uuid,
    sink: EventSink,
    draining: AtomicBool,
    pub inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(id: Uuid, sink: EventSink) -> Self {
        Self {
            id,
            sink,
            draining: AtomicBool::new(false),
            inner: Mutex::new(SessionInner::new()),
        }
    }

    /// Latch the drain; returns false if a drain already ran.
    pub fn begin_drain(&self) -> bool {
        !self.draining.swap(true, Ordering::AcqRel)
    }

    /// Push one event to the client sink. A closed sink means the client is
    /// gone; the event is dropped.
    pub async fn send_event(&self, event: SessionEvent) {
        if self.sink.send(event).await.is_err() {
            debug!(session_id = %self.id, "client sink closed, dropping event");
        }
    }
}

/// Process-wide map of live sessions, shared between the manager and the
/// batch dispatcher.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: parking_lot::RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id, session);
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
