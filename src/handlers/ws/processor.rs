//! Client message routing.
//!
//! Thin adapter between the wire protocol and the session manager: event
//! requests open and close turns, audio messages feed chunks in. All real
//! work happens in the core; failures here only ever affect one connection.

use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::session::EventSink;
use crate::state::AppState;

use super::messages::{
    IncomingMessage, OutgoingMessage, EVENT_PAUSE, EVENT_RESUME, EVENT_TURN_END, EVENT_TURN_START,
};
use super::state::ConnectionState;

/// Route one parsed client message. Returns false to close the connection.
pub async fn handle_incoming_message(
    msg: IncomingMessage,
    conn: &Arc<ConnectionState>,
    event_tx: &EventSink,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        IncomingMessage::EventRequest { event, session_id } => {
            handle_event_request(event, session_id, conn, event_tx, message_tx, app_state).await
        }
        IncomingMessage::AudioStream {
            session_id,
            content,
            tts_status: _,
        } => {
            handle_audio_stream(&session_id, &content, app_state).await;
            true
        }
    }
}

async fn handle_event_request(
    event: u8,
    session_id: Option<String>,
    conn: &Arc<ConnectionState>,
    event_tx: &EventSink,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) -> bool {
    match event {
        EVENT_TURN_START => {
            let id = app_state.manager.start(event_tx.clone()).await;
            conn.add_session(id);
            true
        }

        EVENT_TURN_END => {
            let Some(raw) = session_id else {
                let _ = message_tx
                    .send(OutgoingMessage::Error {
                        message: "turn end requires a sessionId".to_string(),
                    })
                    .await;
                return true;
            };
            let Ok(id) = Uuid::parse_str(&raw) else {
                let _ = message_tx
                    .send(OutgoingMessage::Error {
                        message: format!("malformed sessionId '{raw}'"),
                    })
                    .await;
                return true;
            };

            // Echo the event, then drain off the socket loop: the drain can
            // take up to the configured deadlines.
            let _ = message_tx
                .send(OutgoingMessage::EventResponse {
                    session_id: raw.clone(),
                })
                .await;
            conn.remove_session(&id);
            let manager = Arc::clone(&app_state.manager);
            tokio::spawn(async move {
                manager.end(&id).await;
            });
            true
        }

        EVENT_PAUSE | EVENT_RESUME => {
            debug!(event, "pause/resume accepted (no-op)");
            true
        }

        other => {
            warn!(event = other, "unknown client event code");
            let _ = message_tx
                .send(OutgoingMessage::Error {
                    message: format!("unknown event code {other}"),
                })
                .await;
            true
        }
    }
}

async fn handle_audio_stream(session_id: &str, content: &str, app_state: &Arc<AppState>) {
    let Ok(id) = Uuid::parse_str(session_id) else {
        debug!(session_id, "audio for malformed session id, dropping");
        return;
    };
    match BASE64_STANDARD.decode(content) {
        Ok(pcm) => app_state.manager.on_chunk(&id, &pcm).await,
        Err(e) => warn!(session_id, error = %e, "undecodable audio payload, dropping"),
    }
}

/// Raw binary frames carry bare PCM; they are only routable when the
/// connection owns exactly one session.
pub async fn handle_audio_frame(data: Bytes, conn: &Arc<ConnectionState>, app_state: &Arc<AppState>) {
    match conn.sole_session() {
        Some(id) => app_state.manager.on_chunk(&id, &data).await,
        None => debug!(
            bytes = data.len(),
            "binary audio frame without an unambiguous session, dropping"
        ),
    }
}
