//! Batch speech-to-text engine integration.

pub mod client;
pub mod messages;

pub use client::{AudioEncoding, SpeechRecognizer, SttClient, SttClientConfig, SttError};
pub use messages::{SttBatchItem, Utterance};
