//! Client WebSocket message types.
//!
//! Text frames are JSON tagged by `type`. Audio arrives either base64-coded
//! inside `audioStream` messages or as raw binary frames when the connection
//! owns a single session.

use serde::{Deserialize, Serialize};

use crate::core::session::SessionEvent;
use crate::core::stt::Utterance;

/// Client event codes.
pub const EVENT_TURN_START: u8 = 10;
pub const EVENT_PAUSE: u8 = 11;
pub const EVENT_RESUME: u8 = 12;
pub const EVENT_TURN_END: u8 = 13;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "eventRequest")]
    EventRequest {
        event: u8,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },
    #[serde(rename = "audioStream")]
    AudioStream {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Base64-coded PCM chunk.
        content: String,
        /// Client-side TTS playback state; accepted and ignored.
        #[serde(rename = "ttsStatus", default)]
        tts_status: Option<i32>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "turnReady")]
    TurnReady {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "delivery")]
    Delivery {
        #[serde(rename = "sessionId")]
        session_id: String,
        result: Utterance,
        end: u8,
    },
    #[serde(rename = "deliveryEnd")]
    DeliveryEnd {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "eventResponse")]
    EventResponse {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<SessionEvent> for OutgoingMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::TurnReady { session_id } => OutgoingMessage::TurnReady {
                session_id: session_id.to_string(),
            },
            SessionEvent::Delivery {
                session_id,
                utterance,
                is_final,
            } => OutgoingMessage::Delivery {
                session_id: session_id.to_string(),
                result: utterance,
                end: u8::from(is_final),
            },
            SessionEvent::DeliveryEnd { session_id } => OutgoingMessage::DeliveryEnd {
                session_id: session_id.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_incoming_event_request_parsing() {
        let msg: IncomingMessage = serde_json::from_str(
            r#"{"type":"eventRequest","event":10}"#,
        )
        .unwrap();
        match msg {
            IncomingMessage::EventRequest { event, session_id } => {
                assert_eq!(event, EVENT_TURN_START);
                assert!(session_id.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_incoming_audio_stream_parsing() {
        let msg: IncomingMessage = serde_json::from_str(
            r#"{"type":"audioStream","sessionId":"abc","content":"AAAA","ttsStatus":1}"#,
        )
        .unwrap();
        match msg {
            IncomingMessage::AudioStream {
                session_id,
                content,
                tts_status,
            } => {
                assert_eq!(session_id, "abc");
                assert_eq!(content, "AAAA");
                assert_eq!(tts_status, Some(1));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_delivery_serialization() {
        let sid = Uuid::new_v4();
        let msg: OutgoingMessage = SessionEvent::Delivery {
            session_id: sid,
            utterance: Utterance {
                id: format!("{sid}_0-9"),
                text: "hello".to_string(),
                extra: serde_json::Map::new(),
            },
            is_final: true,
        }
        .into();

        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "delivery");
        assert_eq!(json["sessionId"], sid.to_string());
        assert_eq!(json["end"], 1);
        assert_eq!(json["result"]["text"], "hello");
    }
}
