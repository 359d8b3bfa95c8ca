//! EPD wire protocol types.
//!
//! Upstream frames are binary: 16 raw UUID bytes followed by the PCM chunk
//! verbatim. Downstream frames are JSON text, one status event per frame.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use uuid::Uuid;

/// Per-chunk status emitted by the EPD engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpdStatus {
    Waiting,
    Speech,
    Pause,
    End,
    Timeout,
    MaxTimeout,
    None,
}

impl EpdStatus {
    /// Map the wire integer to a status. Code 5 is unassigned upstream.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Waiting),
            1 => Some(Self::Speech),
            2 => Some(Self::Pause),
            3 => Some(Self::End),
            4 => Some(Self::Timeout),
            6 => Some(Self::MaxTimeout),
            7 => Some(Self::None),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Speech => 1,
            Self::Pause => 2,
            Self::End => 3,
            Self::Timeout => 4,
            Self::MaxTimeout => 6,
            Self::None => 7,
        }
    }
}

/// One inbound EPD status event.
#[derive(Debug, Clone, Deserialize)]
pub struct EpdEvent {
    pub session_id: String,
    pub status: u8,
    #[serde(default)]
    pub speech_score: Option<f64>,
}

impl EpdEvent {
    pub fn status(&self) -> Option<EpdStatus> {
        EpdStatus::from_code(self.status)
    }
}

/// Build one outbound audio frame: `16 raw uuid bytes || pcm`.
pub fn encode_frame(session_id: &Uuid, pcm: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(16 + pcm.len());
    frame.put_slice(session_id.as_bytes());
    frame.put_slice(pcm);
    frame.freeze()
}
