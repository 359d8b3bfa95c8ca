//! EPD engine WebSocket client.
//!
//! One process-wide duplex connection shared by every session. Outbound
//! audio frames are fed through a bounded channel into a spawned connection
//! task; inbound status events are handed to a registered async callback in
//! receive order. The task pings the engine on a heartbeat interval and
//! reconnects with a fixed delay whenever the stream drops. Chunks sent
//! while the connection is down are dropped silently; the segmentation
//! clock simply advances with fewer events.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{encode_frame, EpdEvent};

/// Async callback invoked for every inbound EPD status event.
pub type EpdEventCallback =
    Arc<dyn Fn(EpdEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Outbound frames buffered while the socket is momentarily busy. When the
/// buffer is full or the connection is down, frames are dropped.
const FRAME_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct EpdClientConfig {
    /// WebSocket URL of the EPD engine.
    pub url: String,
    /// Delay before reconnecting after the stream drops.
    pub reconnect_interval: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
}

/// Shared duplex connection to the EPD engine.
pub struct EpdClient {
    config: EpdClientConfig,
    frame_tx: mpsc::Sender<Bytes>,
    frame_rx: parking_lot::Mutex<Option<mpsc::Receiver<Bytes>>>,
    shutdown_tx: broadcast::Sender<()>,
    callback: Arc<Mutex<Option<EpdEventCallback>>>,
    connected: AtomicBool,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EpdClient {
    pub fn new(config: EpdClientConfig) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER_SIZE);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            frame_tx,
            frame_rx: parking_lot::Mutex::new(Some(frame_rx)),
            shutdown_tx,
            callback: Arc::new(Mutex::new(None)),
            connected: AtomicBool::new(false),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Register the event callback. Must be called before `connect` to
    /// observe every event.
    pub async fn on_event(&self, callback: EpdEventCallback) {
        *self.callback.lock().await = Some(callback);
    }

    /// Spawn the connection task. Idempotent; later calls are no-ops.
    pub fn connect(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let Some(frame_rx) = self.frame_rx.lock().take() else {
            return;
        };
        let client = Arc::clone(self);
        *task = Some(tokio::spawn(client.run(frame_rx)));
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue one audio frame for the given session. Drops silently when the
    /// connection is down or the outbound buffer is full; the caller owes no
    /// retry.
    pub fn send(&self, session_id: &Uuid, pcm: &[u8]) {
        if !self.is_connected() {
            debug!(session_id = %session_id, "EPD connection down, dropping chunk");
            return;
        }
        let frame = encode_frame(session_id, pcm);
        if let Err(e) = self.frame_tx.try_send(frame) {
            debug!(session_id = %session_id, error = %e, "EPD outbound buffer full, dropping chunk");
        }
    }

    /// Stop the connection task and close the socket.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }
        self.connected.store(false, Ordering::Release);
    }

    async fn run(self: Arc<Self>, mut frame_rx: mpsc::Receiver<Bytes>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            match connect_async(&self.config.url).await {
                Ok((stream, _)) => {
                    info!(url = %self.config.url, "connected to EPD engine");
                    self.connected.store(true, Ordering::Release);
                    let shutdown = self.serve(stream, &mut frame_rx, &mut shutdown_rx).await;
                    self.connected.store(false, Ordering::Release);
                    if shutdown {
                        break;
                    }
                    warn!("EPD connection lost, scheduling reconnect");
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "EPD connect failed");
                }
            }

            // Frames queued while down are stale; the corresponding EPD
            // events will simply never arrive.
            while frame_rx.try_recv().is_ok() {}

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }
        info!("EPD client stopped");
    }

    /// Serve one established connection. Returns true when shutdown was
    /// requested, false when the stream dropped and a reconnect is due.
    async fn serve(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        frame_rx: &mut mpsc::Receiver<Bytes>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        let (mut sink, mut source) = stream.split();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        heartbeat.tick().await; // immediate first tick

        loop {
            tokio::select! {
                Some(frame) = frame_rx.recv() => {
                    if let Err(e) = sink.send(Message::Binary(frame)).await {
                        warn!(error = %e, "failed to send audio frame to EPD");
                        return false;
                    }
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                        warn!(error = %e, "EPD heartbeat failed");
                        return false;
                    }
                }

                msg = source.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch_event(text.as_str()).await,
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "EPD closed the connection");
                            return false;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "EPD stream error");
                            return false;
                        }
                        None => {
                            info!("EPD stream ended");
                            return false;
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                }
            }
        }
    }

    async fn dispatch_event(&self, text: &str) {
        match serde_json::from_str::<EpdEvent>(text) {
            Ok(event) => {
                if let Some(callback) = self.callback.lock().await.as_ref() {
                    callback(event).await;
                } else {
                    debug!("EPD event received with no callback registered");
                }
            }
            Err(e) => {
                warn!(error = %e, "discarding unparseable EPD event");
            }
        }
    }
}
