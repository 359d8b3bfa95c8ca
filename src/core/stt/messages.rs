//! STT HTTP API types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One utterance submitted for recognition.
#[derive(Debug, Clone)]
pub struct SttBatchItem {
    pub session_id: Uuid,
    /// First chunk of the utterance (inclusive).
    pub start: u64,
    /// One past the last chunk of the utterance.
    pub end: u64,
    pub pcm: Vec<u8>,
    pub is_final: bool,
}

impl SttBatchItem {
    /// Wire identity of the utterance; the STT engine echoes it back as the
    /// filename stem.
    pub fn utterance_id(&self) -> String {
        format!("{}_{}-{}", self.session_id, self.start, self.end)
    }
}

/// Batch response envelope: `{content: {result: {utterances: [...]}}}`.
#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    pub content: BatchContent,
}

#[derive(Debug, Deserialize)]
pub struct BatchContent {
    pub result: BatchResult,
}

#[derive(Debug, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

/// One recognized utterance. The engine may attach fields beyond the text;
/// they are preserved and forwarded to the client verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
