//! Session lifecycle management.
//!
//! The manager owns session creation, chunk ingress, EPD event routing and
//! the turn-end drain protocol. The segmentation clock is EPD-authoritative:
//! chunk receipt never advances it, only EPD responses do, which is what
//! makes the drain's quiescence detection sound.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::dispatch::dispatcher::deliver;
use crate::core::dispatch::{BatchDispatcher, WorkItem, WorkQueue};
use crate::core::epd::{EpdClient, EpdEvent, EpdEventCallback};

use super::session::{EventSink, Session, SessionEvent, SessionRegistry};

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Poll interval for the drain's quiescence checks.
    pub drain_poll_interval: Duration,
    /// Upper bound on waiting for EPD quiescence at turn end.
    pub drain_max_wait: Duration,
    /// Upper bound on waiting for delivery quiescence; past it, holes are
    /// skipped and pending results are released best-effort.
    pub delivery_max_wait: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            drain_poll_interval: Duration::from_millis(500),
            drain_max_wait: Duration::from_secs(25),
            delivery_max_wait: Duration::from_secs(5),
        }
    }
}

pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    queue: Arc<WorkQueue>,
    epd: Arc<EpdClient>,
    dispatcher: Arc<BatchDispatcher>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        queue: Arc<WorkQueue>,
        epd: Arc<EpdClient>,
        dispatcher: Arc<BatchDispatcher>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            registry,
            queue,
            epd,
            dispatcher,
            config,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Open a new session for a turn and notify the client it is ready.
    pub async fn start(&self, sink: EventSink) -> Uuid {
        let id = Uuid::new_v4();
        let session = Arc::new(Session::new(id, sink));
        self.registry.insert(Arc::clone(&session));
        info!(session_id = %id, "session started");
        session
            .send_event(SessionEvent::TurnReady { session_id: id })
            .await;
        id
    }

    /// Ingest one audio chunk: buffer it, then forward it to the EPD
    /// engine. The chunk clock is *not* advanced here.
    pub async fn on_chunk(&self, session_id: &Uuid, pcm: &[u8]) {
        let Some(session) = self.registry.get(session_id) else {
            debug!(session_id = %session_id, "chunk for unknown session, dropping");
            return;
        };
        {
            let mut inner = session.inner.lock().await;
            inner.buffer.append(pcm);
        }
        self.epd.send(session_id, pcm);
    }

    /// Route one EPD status event to its session's segmenter, assigning a
    /// sequence number to any resulting work item.
    pub async fn on_epd(&self, event: EpdEvent) {
        let Ok(session_id) = Uuid::parse_str(&event.session_id) else {
            warn!(session_id = %event.session_id, "EPD event with malformed session id");
            return;
        };
        let Some(status) = event.status() else {
            warn!(code = event.status, "EPD event with unknown status code");
            return;
        };
        let Some(session) = self.registry.get(&session_id) else {
            debug!(session_id = %session_id, "EPD event for unknown session, dropping");
            return;
        };

        let mut inner = session.inner.lock().await;
        if let Some(emission) = inner.segmenter.on_event(status) {
            let sequence = inner.next_seq;
            inner.next_seq += 1;
            debug!(session_id = %session_id, seq = sequence,
                   start = emission.start, end = emission.end,
                   is_final = emission.is_final, "enqueueing recognition");
            self.queue.push(WorkItem {
                session_id,
                sequence,
                start: emission.start,
                end: emission.end,
                is_final: emission.is_final,
            });
        }
    }

    /// Turn-end drain: wait for EPD quiescence, close the open utterance,
    /// flush this session's recognition backlog, wait for delivery, then
    /// emit `deliveryEnd` and clean up. Always completes within the
    /// configured bounds; a session with total STT failure still gets its
    /// `deliveryEnd`.
    pub async fn end(&self, session_id: &Uuid) {
        let Some(session) = self.registry.get(session_id) else {
            debug!(session_id = %session_id, "turn end for unknown session");
            return;
        };
        if !session.begin_drain() {
            debug!(session_id = %session_id, "drain already in progress");
            return;
        }

        self.await_epd_quiescence(&session).await;

        // Leftover final for the utterance still open at turn end.
        {
            let mut inner = session.inner.lock().await;
            if let Some(emission) = inner.segmenter.leftover_final() {
                let sequence = inner.next_seq;
                inner.next_seq += 1;
                self.queue.push(WorkItem {
                    session_id: *session_id,
                    sequence,
                    start: emission.start,
                    end: emission.end,
                    is_final: emission.is_final,
                });
            }
        }

        self.dispatcher.flush_session(session_id).await;
        self.await_delivery_quiescence(&session).await;

        {
            let inner = session.inner.lock().await;
            info!(session_id = %session_id,
                  chunks = inner.segmenter.n_chunks(),
                  sequences = inner.next_seq,
                  stt_calls = inner.stats.count,
                  stt_avg_ms = inner.stats.average_ms(),
                  "session drained");
        }
        session
            .send_event(SessionEvent::DeliveryEnd { session_id: *session_id })
            .await;
        self.cleanup(session_id);
    }

    /// Erase all per-session state.
    pub fn cleanup(&self, session_id: &Uuid) {
        self.queue.purge_session(session_id);
        self.registry.remove(session_id);
        debug!(session_id = %session_id, "session cleaned up");
    }

    /// EPD event callback wiring for the shared client.
    pub fn event_callback(self: &Arc<Self>) -> EpdEventCallback {
        let manager = Arc::clone(self);
        Arc::new(move |event| {
            let manager = Arc::clone(&manager);
            Box::pin(async move {
                manager.on_epd(event).await;
            })
        })
    }

    /// The EPD stream is quiescent once the chunk clock stops advancing for
    /// one full poll interval. The wait is hard-capped at `drain_max_wait`:
    /// the timeout cancels the poll loop mid-sleep, so a stream that keeps
    /// advancing cannot stretch the drain past the deadline.
    async fn await_epd_quiescence(&self, session: &Arc<Session>) {
        let poll_interval = self.config.drain_poll_interval;
        let quiesced = timeout(self.config.drain_max_wait, async {
            let mut last = session.inner.lock().await.segmenter.n_chunks();
            loop {
                tokio::time::sleep(poll_interval).await;
                let current = session.inner.lock().await.segmenter.n_chunks();
                if current == last {
                    return;
                }
                last = current;
            }
        })
        .await;
        if quiesced.is_err() {
            warn!(session_id = %session.id, "drain deadline hit waiting for EPD quiescence");
        }
    }

    /// Delivery is quiescent once every issued sequence has been released.
    /// Past the deadline, pending results are released with holes skipped.
    async fn await_delivery_quiescence(&self, session: &Arc<Session>) {
        let deadline = Instant::now() + self.config.delivery_max_wait;
        loop {
            {
                let inner = session.inner.lock().await;
                if inner.reassembler.pending_len() == 0
                    && inner.reassembler.expected_seq() == inner.next_seq
                {
                    return;
                }
            }
            if Instant::now() >= deadline {
                let released = {
                    let mut inner = session.inner.lock().await;
                    warn!(session_id = %session.id,
                          pending = inner.reassembler.pending_len(),
                          "delivery deadline hit, skipping holes");
                    inner.reassembler.release_remaining()
                };
                deliver(session, released).await;
                return;
            }
            tokio::time::sleep(self.config.drain_poll_interval).await;
        }
    }
}
