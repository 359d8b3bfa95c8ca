//! End-to-end session flow over an in-process manager with a mock STT
//! engine: chunk and EPD traces go in, strictly ordered deliveries and a
//! final `deliveryEnd` come out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use speechgate::core::audio::BYTES_PER_CHUNK;
use speechgate::core::dispatch::{BatchDispatcher, WorkQueue};
use speechgate::core::epd::{EpdClient, EpdClientConfig, EpdEvent, EpdStatus};
use speechgate::core::session::{
    SessionEvent, SessionManager, SessionManagerConfig, SessionRegistry,
};
use speechgate::core::stt::{SpeechRecognizer, SttBatchItem, SttError, Utterance};

/// Answers every submitted item with a canned transcript; specific calls can
/// be made to fail to simulate dropped batches.
struct MockRecognizer {
    calls: Mutex<Vec<Vec<String>>>,
    fail_calls: Vec<usize>,
}

impl MockRecognizer {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_calls: Vec::new(),
        }
    }

    fn failing_on(fail_calls: Vec<usize>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_calls,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn batch(&self, items: &[SttBatchItem]) -> Result<Vec<Utterance>, SttError> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(items.iter().map(|i| i.utterance_id()).collect());
            calls.len() - 1
        };
        if self.fail_calls.contains(&call_index) {
            return Err(SttError::Http { status: 503 });
        }
        Ok(items
            .iter()
            .map(|item| Utterance {
                id: item.utterance_id(),
                text: format!("transcript {}-{}", item.start, item.end),
                extra: serde_json::Map::new(),
            })
            .collect())
    }
}

struct Harness {
    manager: Arc<SessionManager>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<BatchDispatcher>,
    recognizer: Arc<MockRecognizer>,
    events: mpsc::Receiver<SessionEvent>,
    session_id: Uuid,
}

/// Build the full core wiring with a mock recognizer and one open session.
/// The dispatcher tick is not spawned; tests drive it explicitly so batch
/// boundaries are deterministic.
async fn harness(recognizer: MockRecognizer) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let queue = Arc::new(WorkQueue::new());
    let recognizer = Arc::new(recognizer);
    let dispatcher = Arc::new(BatchDispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&registry),
        Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>,
        Duration::from_millis(500),
    ));
    // Never connected: chunk forwarding drops silently, which is exactly the
    // EPD-down behavior.
    let epd = Arc::new(EpdClient::new(EpdClientConfig {
        url: "ws://127.0.0.1:1/epd".to_string(),
        reconnect_interval: Duration::from_secs(60),
        heartbeat_interval: Duration::from_secs(60),
    }));
    let manager = Arc::new(SessionManager::new(
        registry.clone(),
        queue,
        epd,
        Arc::clone(&dispatcher),
        SessionManagerConfig {
            drain_poll_interval: Duration::from_millis(20),
            drain_max_wait: Duration::from_secs(2),
            delivery_max_wait: Duration::from_millis(200),
        },
    ));

    let (tx, mut events) = mpsc::channel(64);
    let session_id = manager.start(tx).await;
    match events.recv().await.unwrap() {
        SessionEvent::TurnReady { session_id: id } => assert_eq!(id, session_id),
        other => panic!("expected turnReady, got {other:?}"),
    }

    Harness {
        manager,
        registry,
        dispatcher,
        recognizer,
        events,
        session_id,
    }
}

impl Harness {
    async fn feed_chunks(&self, count: usize) {
        for _ in 0..count {
            self.manager
                .on_chunk(&self.session_id, &vec![0u8; BYTES_PER_CHUNK])
                .await;
        }
    }

    async fn feed_epd(&self, trace: &[EpdStatus]) {
        for status in trace {
            self.manager
                .on_epd(EpdEvent {
                    session_id: self.session_id.to_string(),
                    status: status.code(),
                    speech_score: None,
                })
                .await;
        }
    }
}

/// Collect `(start, end, is_final)` triples until `deliveryEnd`.
async fn collect_deliveries(
    events: &mut mpsc::Receiver<SessionEvent>,
    expected_session: Uuid,
) -> Vec<(String, bool)> {
    let mut deliveries = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("event channel closed before deliveryEnd");
        match event {
            SessionEvent::Delivery {
                session_id,
                utterance,
                is_final,
            } => {
                assert_eq!(session_id, expected_session);
                deliveries.push((utterance.id, is_final));
            }
            SessionEvent::DeliveryEnd { session_id } => {
                assert_eq!(session_id, expected_session);
                return deliveries;
            }
            SessionEvent::TurnReady { .. } => panic!("unexpected turnReady"),
        }
    }
}

#[tokio::test]
async fn test_single_utterance_turn() {
    let mut h = harness(MockRecognizer::new()).await;
    let sid = h.session_id;

    // W,W,W then sustained speech: a step partial at chunk 9, then the
    // leftover final [0, 10) at turn end.
    h.feed_chunks(10).await;
    let mut trace = vec![EpdStatus::Waiting; 3];
    trace.extend(vec![EpdStatus::Speech; 7]);
    h.feed_epd(&trace).await;

    h.manager.end(&sid).await;
    let deliveries = collect_deliveries(&mut h.events, sid).await;

    assert_eq!(
        deliveries,
        vec![
            (format!("{sid}_0-9"), false),
            (format!("{sid}_0-10"), true),
        ]
    );
    assert!(h.registry.is_empty(), "session must be cleaned up after drain");
}

#[tokio::test]
async fn test_two_utterances_deliver_in_order() {
    let mut h = harness(MockRecognizer::new()).await;
    let sid = h.session_id;

    h.feed_chunks(22).await;
    let mut trace = vec![EpdStatus::Speech; 10];
    trace.push(EpdStatus::End);
    trace.extend(vec![EpdStatus::Speech; 10]);
    trace.push(EpdStatus::End);
    h.feed_epd(&trace).await;

    h.manager.end(&sid).await;
    let deliveries = collect_deliveries(&mut h.events, sid).await;

    assert_eq!(
        deliveries,
        vec![
            (format!("{sid}_0-6"), false),
            (format!("{sid}_0-11"), true),
            (format!("{sid}_11-17"), false),
            (format!("{sid}_11-22"), true),
        ]
    );
}

#[tokio::test]
async fn test_no_speech_turn_delivers_nothing() {
    let mut h = harness(MockRecognizer::new()).await;
    let sid = h.session_id;

    h.feed_chunks(20).await;
    h.feed_epd(&vec![EpdStatus::Waiting; 20]).await;

    h.manager.end(&sid).await;
    let deliveries = collect_deliveries(&mut h.events, sid).await;

    assert!(deliveries.is_empty());
    assert_eq!(h.recognizer.call_count(), 0);
}

#[tokio::test]
async fn test_dropped_batch_hole_is_skipped_after_drain() {
    // Three partials in three separate batches; the second batch fails.
    let mut h = harness(MockRecognizer::failing_on(vec![1])).await;
    let sid = h.session_id;

    h.feed_chunks(16).await;

    // seq 0: partial [0, 6)
    h.feed_epd(&vec![EpdStatus::Speech; 6]).await;
    h.dispatcher.run_tick().await;
    // seq 1: partial [0, 11); this batch fails and leaves a hole.
    h.feed_epd(&vec![EpdStatus::Speech; 5]).await;
    h.dispatcher.run_tick().await;
    // seq 2: partial [0, 16), buffered behind the hole.
    h.feed_epd(&vec![EpdStatus::Speech; 5]).await;
    h.dispatcher.run_tick().await;

    // seq 0 was delivered during the live session; seq 2 must be withheld.
    match h.events.recv().await.unwrap() {
        SessionEvent::Delivery { utterance, .. } => {
            assert_eq!(utterance.id, format!("{sid}_0-6"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Drain: the leftover final (seq 3) flushes, then the delivery deadline
    // skips seq 1's hole and releases the buffered results.
    h.manager.end(&sid).await;
    let deliveries = collect_deliveries(&mut h.events, sid).await;

    assert_eq!(
        deliveries,
        vec![
            (format!("{sid}_0-16"), false),
            (format!("{sid}_0-16"), true),
        ]
    );
    assert_eq!(h.recognizer.call_count(), 4);
}

#[tokio::test]
async fn test_turn_end_is_idempotent() {
    let mut h = harness(MockRecognizer::new()).await;
    let sid = h.session_id;

    h.feed_chunks(5).await;
    h.feed_epd(&vec![EpdStatus::Waiting; 5]).await;

    let first = h.manager.end(&sid);
    let second = h.manager.end(&sid);
    tokio::join!(first, second);

    // Exactly one deliveryEnd.
    let deliveries = collect_deliveries(&mut h.events, sid).await;
    assert!(deliveries.is_empty());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.events.recv())
            .await
            .is_err(),
        "second drain must not emit another deliveryEnd"
    );
}

#[tokio::test]
async fn test_events_for_unknown_sessions_are_dropped() {
    let h = harness(MockRecognizer::new()).await;

    // Chunk and EPD traffic for a session that does not exist.
    let ghost = Uuid::new_v4();
    h.manager.on_chunk(&ghost, &[0u8; 64]).await;
    h.manager
        .on_epd(EpdEvent {
            session_id: ghost.to_string(),
            status: EpdStatus::Speech.code(),
            speech_score: None,
        })
        .await;
    h.manager
        .on_epd(EpdEvent {
            session_id: "not-a-uuid".to_string(),
            status: 1,
            speech_score: None,
        })
        .await;

    // The real session is untouched.
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.recognizer.call_count(), 0);
}
