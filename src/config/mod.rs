//! Server configuration.

mod env;
pub mod utils;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::stt::AudioEncoding;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Full gateway configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// EPD engine WebSocket URL.
    pub ws_url: String,
    pub ws_reconnect_interval: Duration,
    pub ws_heartbeat_interval: Duration,

    /// Single-utterance STT endpoint.
    pub speech_api_url: String,
    /// Batch STT endpoint.
    pub speech_api_batch_url: String,
    pub speech_api_token: Option<String>,

    pub temp_dir: PathBuf,
    pub wav_dir: PathBuf,
    pub result_dir: PathBuf,

    pub audio_encoding: AudioEncoding,
    pub mp3_encoder: String,

    pub dispatch_tick: Duration,
    pub drain_poll_interval: Duration,
    pub drain_max_wait: Duration,
    pub delivery_max_wait: Duration,

    /// Deployment environment; selects the default upstream URLs.
    pub app_env: String,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ws_url: "ws://localhost:8081/epd".to_string(),
            ws_reconnect_interval: Duration::from_secs(5),
            ws_heartbeat_interval: Duration::from_secs(30),
            speech_api_url: "http://localhost:8000/speech".to_string(),
            speech_api_batch_url: "http://localhost:8000/speech/batch".to_string(),
            speech_api_token: None,
            temp_dir: PathBuf::from("./tmp"),
            wav_dir: PathBuf::from("./tmp/wav"),
            result_dir: PathBuf::from("./tmp/result"),
            audio_encoding: AudioEncoding::Wav,
            mp3_encoder: "lame".to_string(),
            dispatch_tick: Duration::from_millis(500),
            drain_poll_interval: Duration::from_millis(500),
            drain_max_wait: Duration::from_secs(25),
            delivery_max_wait: Duration::from_secs(5),
            app_env: "development".to_string(),
        }
    }
}
