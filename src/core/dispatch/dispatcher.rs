//! Batch STT dispatcher.
//!
//! A single long-running task drains the global work queue on a fixed tick,
//! resolves each item's PCM from its session buffer, and submits one batch
//! to the recognizer. Results are routed back to the owning session's
//! reorder buffer. Failed batches are logged and dropped; a retry would
//! permute sequence ordering downstream, so holes are left for the drain
//! deadline to sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::session::{DeliveryResult, Session, SessionEvent, SessionRegistry};
use crate::core::stt::{SpeechRecognizer, SttBatchItem};

use super::queue::{WorkItem, WorkQueue};

/// Maximum items submitted to the STT engine per request.
pub const BATCH_SIZE: usize = 16;

pub struct BatchDispatcher {
    queue: Arc<WorkQueue>,
    registry: Arc<SessionRegistry>,
    recognizer: Arc<dyn SpeechRecognizer>,
    tick: Duration,
}

impl BatchDispatcher {
    pub fn new(
        queue: Arc<WorkQueue>,
        registry: Arc<SessionRegistry>,
        recognizer: Arc<dyn SpeechRecognizer>,
        tick: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            recognizer,
            tick,
        }
    }

    /// Spawn the periodic drain loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_tick().await;
            }
        })
    }

    /// One tick: splice the head of the global queue and process it.
    pub async fn run_tick(&self) {
        let items = self.queue.splice(BATCH_SIZE);
        if !items.is_empty() {
            self.process(items).await;
        }
    }

    /// Drain-time flush: process every queued item for one session, in
    /// ascending-sequence batches, until none remain.
    pub async fn flush_session(&self, session_id: &Uuid) {
        loop {
            let items = self.queue.take_session(session_id, BATCH_SIZE);
            if items.is_empty() {
                break;
            }
            self.process(items).await;
        }
    }

    async fn process(&self, mut items: Vec<WorkItem>) {
        // Inputs interleave sessions; ascending sequence keeps each
        // session's partials ahead of its final.
        items.sort_by_key(|item| item.sequence);

        let mut batch: Vec<SttBatchItem> = Vec::with_capacity(items.len());
        // An utterance id can repeat within a batch (a short-pause partial
        // and the leftover final share the same chunk range), so each id
        // routes to a queue of waiting items.
        let mut routes: HashMap<String, VecDeque<(Arc<Session>, WorkItem)>> =
            HashMap::with_capacity(items.len());

        for item in items {
            let Some(session) = self.registry.get(&item.session_id) else {
                debug!(session_id = %item.session_id, seq = item.sequence,
                       "dropping work item for unknown session");
                continue;
            };

            let released = {
                let mut inner = session.inner.lock().await;
                match inner.buffer.read_range(item.start, item.end) {
                    Ok(pcm) => {
                        // A final closes the utterance: its audio can be
                        // released now that the bytes are captured.
                        if item.is_final {
                            inner.buffer.truncate_until(item.end);
                        }
                        let stt_item = SttBatchItem {
                            session_id: item.session_id,
                            start: item.start,
                            end: item.end,
                            pcm,
                            is_final: item.is_final,
                        };
                        routes
                            .entry(stt_item.utterance_id())
                            .or_default()
                            .push_back((Arc::clone(&session), item));
                        batch.push(stt_item);
                        Vec::new()
                    }
                    Err(e) => {
                        // Range below the truncated head: segment already
                        // delivered; skip and advance the sequence.
                        debug!(session_id = %item.session_id, seq = item.sequence,
                               error = %e, "work item below buffer base, skipping");
                        inner.reassembler.mark_skipped(item.sequence)
                    }
                }
            };
            deliver(&session, released).await;
        }

        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        match self.recognizer.batch(&batch).await {
            Ok(utterances) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                for utterance in utterances {
                    let Some((session, item)) =
                        routes.get_mut(&utterance.id).and_then(|q| q.pop_front())
                    else {
                        warn!(id = %utterance.id, "STT result with unknown utterance id");
                        continue;
                    };
                    let released = {
                        let mut inner = session.inner.lock().await;
                        inner.stats.record(elapsed_ms);
                        inner.reassembler.accept(
                            item.sequence,
                            DeliveryResult {
                                utterance,
                                is_final: item.is_final,
                            },
                        )
                    };
                    deliver(&session, released).await;
                }
                // Items the engine omitted stay as holes until drain.
                for (id, waiting) in routes {
                    for (_, item) in waiting {
                        warn!(id = %id, seq = item.sequence, "STT response omitted utterance");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, dropped = batch.len(),
                      "STT batch failed, dropping sequences");
            }
        }
    }
}

/// Emit a run of released results to the session's client sink.
pub(crate) async fn deliver(session: &Arc<Session>, released: Vec<(u64, DeliveryResult)>) {
    for (_, result) in released {
        session
            .send_event(SessionEvent::Delivery {
                session_id: session.id,
                utterance: result.utterance,
                is_final: result.is_final,
            })
            .await;
    }
}
