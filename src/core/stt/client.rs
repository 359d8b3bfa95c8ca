//! Batch STT HTTP client.
//!
//! Stateless caller: PCM slices are wrapped in a WAV container (or handed to
//! an external MP3 encoder), written to the dated scratch directory, posted
//! as one multipart form, and reassociated with their inputs by utterance id.
//! Batches are never retried; a retry would reorder sequences downstream.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::audio::wav::encode_wav;

use super::messages::{BatchResponse, SttBatchItem, Utterance};

/// Error types for STT operations.
#[derive(Debug, Error)]
pub enum SttError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("STT engine returned status {status}")]
    Http { status: u16 },
    #[error("scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio encoder failed: {0}")]
    Encoder(String),
}

/// Upload format for utterance payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEncoding {
    #[default]
    Wav,
    Mp3,
}

impl AudioEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }
}

impl FromStr for AudioEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            other => Err(format!("unsupported audio encoding '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SttClientConfig {
    /// Endpoint for one-utterance requests (`file` field).
    pub single_url: String,
    /// Endpoint for multi-utterance requests (repeated `files` field).
    pub batch_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    pub encoding: AudioEncoding,
    /// External encoder command used for MP3 output.
    pub mp3_encoder: String,
    /// Intermediate directory for encoder input/output.
    pub wav_dir: PathBuf,
    /// Scratch root; uploads land under `<result_dir>/YYYY-MM-DD/<session>/`.
    pub result_dir: PathBuf,
    pub request_timeout: Duration,
}

/// Recognition seam consumed by the batch dispatcher. The production
/// implementation is [`SttClient`]; tests substitute mocks.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn batch(&self, items: &[SttBatchItem]) -> Result<Vec<Utterance>, SttError>;
}

/// Production STT caller over a shared tuned HTTP client.
pub struct SttClient {
    config: SttClientConfig,
    http: reqwest::Client,
}

impl SttClient {
    pub fn new(config: SttClientConfig) -> Result<Self, SttError> {
        let http = reqwest::Client::builder()
            .http2_keep_alive_interval(Some(Duration::from_secs(5)))
            .http2_keep_alive_while_idle(true)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(2))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Encode one utterance payload per the configured format.
    async fn encode(&self, item: &SttBatchItem) -> Result<Vec<u8>, SttError> {
        match self.config.encoding {
            AudioEncoding::Wav => Ok(encode_wav(&item.pcm)),
            AudioEncoding::Mp3 => self.encode_mp3(item).await,
        }
    }

    /// Shell out to the external MP3 encoder through the intermediate
    /// directory.
    async fn encode_mp3(&self, item: &SttBatchItem) -> Result<Vec<u8>, SttError> {
        tokio::fs::create_dir_all(&self.config.wav_dir).await?;
        let stem = item.utterance_id();
        let wav_path = self.config.wav_dir.join(format!("{stem}.wav"));
        let mp3_path = self.config.wav_dir.join(format!("{stem}.mp3"));

        tokio::fs::write(&wav_path, encode_wav(&item.pcm)).await?;
        let status = tokio::process::Command::new(&self.config.mp3_encoder)
            .arg("--quiet")
            .arg(&wav_path)
            .arg(&mp3_path)
            .status()
            .await
            .map_err(|e| SttError::Encoder(format!("{}: {e}", self.config.mp3_encoder)))?;
        if !status.success() {
            let _ = tokio::fs::remove_file(&wav_path).await;
            return Err(SttError::Encoder(format!(
                "{} exited with {status}",
                self.config.mp3_encoder
            )));
        }

        let encoded = tokio::fs::read(&mp3_path).await?;
        let _ = tokio::fs::remove_file(&wav_path).await;
        let _ = tokio::fs::remove_file(&mp3_path).await;
        Ok(encoded)
    }
}

#[async_trait]
impl SpeechRecognizer for SttClient {
    async fn batch(&self, items: &[SttBatchItem]) -> Result<Vec<Utterance>, SttError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let single = items.len() == 1;
        let field = if single { "file" } else { "files" };

        let mut form = Form::new();
        let mut scratch = Vec::with_capacity(items.len());
        for item in items {
            let encoded = self.encode(item).await?;
            let filename = format!(
                "{}.{}",
                item.utterance_id(),
                self.config.encoding.extension()
            );

            let dir = self
                .config
                .result_dir
                .join(&date)
                .join(item.session_id.to_string());
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(&filename);
            tokio::fs::write(&path, &encoded).await?;
            scratch.push(path);

            let part = Part::bytes(encoded)
                .file_name(filename)
                .mime_str(self.config.encoding.mime())?;
            form = form.part(field, part);
        }

        let url = if single {
            &self.config.single_url
        } else {
            &self.config.batch_url
        };
        let mut request = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .multipart(form);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let outcome = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SttError::Http {
                    status: status.as_u16(),
                });
            }
            let parsed: BatchResponse = response.json().await?;
            debug!(
                utterances = parsed.content.result.utterances.len(),
                submitted = items.len(),
                "STT batch completed"
            );
            Ok(parsed.content.result.utterances)
        }
        .await;

        for path in &scratch {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "failed to unlink scratch file");
            }
        }
        outcome
    }
}
