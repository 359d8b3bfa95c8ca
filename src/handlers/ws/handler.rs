//! Axum WebSocket handler.
//!
//! Owns the socket for one client connection: parses inbound frames, routes
//! them through the processor, and serializes outbound messages from a
//! single sender task. Core session events are bridged into wire messages by
//! a forwarder so every session of the connection shares one ordered
//! outbound path.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::session::SessionEvent;
use crate::state::AppState;

use super::messages::{IncomingMessage, OutgoingMessage};
use super::processor::{handle_audio_frame, handle_incoming_message};
use super::state::ConnectionState;

/// Sized for audio-rate traffic; deliveries are far sparser than chunks.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Upgrade handler for the gateway WebSocket endpoint.
pub async fn ws_gateway_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_gateway_socket(socket, state))
}

async fn handle_gateway_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let conn = Arc::new(ConnectionState::new());

    let (message_tx, mut message_rx) = mpsc::channel::<OutgoingMessage>(CHANNEL_BUFFER_SIZE);

    // Single writer for the socket.
    let sender_task = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if let Err(e) = sender.send(Message::Text(json.into())).await {
                        error!(error = %e, "failed to send WebSocket message");
                        break;
                    }
                }
                Err(e) => error!(error = %e, "failed to serialize outgoing message"),
            }
        }
    });

    // Bridge core session events onto the wire.
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(CHANNEL_BUFFER_SIZE);
    let bridge_tx = message_tx.clone();
    let forwarder_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if bridge_tx.send(event.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(msg) => {
                let continue_processing =
                    process_message(msg, &conn, &event_tx, &message_tx, &app_state).await;
                if !continue_processing {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect is an implicit turn end for every session this connection
    // owns; drains run detached so the socket teardown is not delayed.
    for id in conn.take_sessions() {
        let manager = Arc::clone(&app_state.manager);
        tokio::spawn(async move {
            manager.end(&id).await;
        });
    }

    sender_task.abort();
    drop(forwarder_task);
    info!("WebSocket connection terminated");
}

async fn process_message(
    msg: Message,
    conn: &Arc<ConnectionState>,
    event_tx: &mpsc::Sender<SessionEvent>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let incoming: IncomingMessage = match serde_json::from_str(text.as_str()) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "failed to parse incoming message");
                    let _ = message_tx
                        .send(OutgoingMessage::Error {
                            message: format!("invalid message format: {e}"),
                        })
                        .await;
                    return true;
                }
            };
            handle_incoming_message(incoming, conn, event_tx, message_tx, app_state).await
        }
        Message::Binary(data) => {
            handle_audio_frame(data, conn, app_state).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            debug!("WebSocket closed by client");
            false
        }
    }
}
