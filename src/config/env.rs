use std::env;
use std::path::PathBuf;

use super::utils::{parse_millis, parse_or, parse_secs};
use super::{ConfigError, ServerConfig};

/// Production defaults for the upstream engines; development points at
/// localhost.
const PROD_WS_URL: &str = "ws://epd-engine:8081/epd";
const PROD_SPEECH_API_URL: &str = "http://speech-engine:8000/speech";
const PROD_SPEECH_API_BATCH_URL: &str = "http://speech-engine:8000/speech/batch";

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads from the process environment with sensible defaults, loading a
    /// `.env` file first if one is present. `APP_ENV=production` switches
    /// the default upstream URLs; explicit variables always win.
    ///
    /// # Errors
    /// Returns an error when a present variable fails to parse or an
    /// interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = ServerConfig::default();
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| defaults.app_env.clone());
        let production = app_env == "production";

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = parse_or("PORT", env::var("PORT").ok(), defaults.port)?;

        let ws_url = env::var("WS_URL").unwrap_or_else(|_| {
            if production {
                PROD_WS_URL.to_string()
            } else {
                defaults.ws_url.clone()
            }
        });
        let ws_reconnect_interval = parse_secs(
            "WS_RECONNECT_INTERVAL",
            env::var("WS_RECONNECT_INTERVAL").ok(),
            defaults.ws_reconnect_interval,
        )?;
        let ws_heartbeat_interval = parse_secs(
            "WS_HEARTBEAT_INTERVAL",
            env::var("WS_HEARTBEAT_INTERVAL").ok(),
            defaults.ws_heartbeat_interval,
        )?;

        let speech_api_url = env::var("SPEECH_API_URL").unwrap_or_else(|_| {
            if production {
                PROD_SPEECH_API_URL.to_string()
            } else {
                defaults.speech_api_url.clone()
            }
        });
        let speech_api_batch_url = env::var("SPEECH_API_BATCH_URL").unwrap_or_else(|_| {
            if production {
                PROD_SPEECH_API_BATCH_URL.to_string()
            } else {
                defaults.speech_api_batch_url.clone()
            }
        });
        let speech_api_token = env::var("SPEECH_API_TOKEN").ok().filter(|t| !t.is_empty());

        let temp_dir = env::var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_dir);
        let wav_dir = env::var("WAV_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| temp_dir.join("wav"));
        let result_dir = env::var("RESULT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| temp_dir.join("result"));

        let audio_encoding = match env::var("AUDIO_ENCODING") {
            Ok(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                name: "AUDIO_ENCODING",
                message,
            })?,
            Err(_) => defaults.audio_encoding,
        };
        let mp3_encoder = env::var("MP3_ENCODER").unwrap_or(defaults.mp3_encoder);

        let dispatch_tick = parse_millis(
            "DISPATCH_TICK_MS",
            env::var("DISPATCH_TICK_MS").ok(),
            defaults.dispatch_tick,
        )?;
        let drain_poll_interval = parse_millis(
            "DRAIN_POLL_INTERVAL_MS",
            env::var("DRAIN_POLL_INTERVAL_MS").ok(),
            defaults.drain_poll_interval,
        )?;
        let drain_max_wait = parse_millis(
            "DRAIN_MAX_WAIT_MS",
            env::var("DRAIN_MAX_WAIT_MS").ok(),
            defaults.drain_max_wait,
        )?;
        let delivery_max_wait = parse_millis(
            "DELIVERY_MAX_WAIT_MS",
            env::var("DELIVERY_MAX_WAIT_MS").ok(),
            defaults.delivery_max_wait,
        )?;

        Ok(ServerConfig {
            host,
            port,
            ws_url,
            ws_reconnect_interval,
            ws_heartbeat_interval,
            speech_api_url,
            speech_api_batch_url,
            speech_api_token,
            temp_dir,
            wav_dir,
            result_dir,
            audio_encoding,
            mp3_encoder,
            dispatch_tick,
            drain_poll_interval,
            drain_max_wait,
            delivery_max_wait,
            app_env,
        })
    }
}
