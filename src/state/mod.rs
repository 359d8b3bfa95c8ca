use std::sync::Arc;

use anyhow::Context;

use crate::config::ServerConfig;
use crate::core::dispatch::{BatchDispatcher, WorkQueue};
use crate::core::epd::{EpdClient, EpdClientConfig};
use crate::core::session::{SessionManager, SessionManagerConfig, SessionRegistry};
use crate::core::stt::{SpeechRecognizer, SttClient, SttClientConfig};

/// Application state shared across handlers: the session manager, the shared
/// EPD connection and the running batch dispatcher.
pub struct AppState {
    pub config: ServerConfig,
    pub manager: Arc<SessionManager>,
    pub epd: Arc<EpdClient>,
}

impl AppState {
    /// Wire up the long-lived components and start them: the dispatcher tick
    /// loop and the EPD connection with its event route into the manager.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let registry = Arc::new(SessionRegistry::new());
        let queue = Arc::new(WorkQueue::new());

        let recognizer: Arc<dyn SpeechRecognizer> = Arc::new(
            SttClient::new(SttClientConfig {
                single_url: config.speech_api_url.clone(),
                batch_url: config.speech_api_batch_url.clone(),
                token: config.speech_api_token.clone(),
                encoding: config.audio_encoding,
                mp3_encoder: config.mp3_encoder.clone(),
                wav_dir: config.wav_dir.clone(),
                result_dir: config.result_dir.clone(),
                request_timeout: std::time::Duration::from_secs(30),
            })
            .context("failed to build STT client")?,
        );

        let dispatcher = Arc::new(BatchDispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            recognizer,
            config.dispatch_tick,
        ));
        // The tick loop lives as long as the process.
        let _ = Arc::clone(&dispatcher).spawn();

        let epd = Arc::new(EpdClient::new(EpdClientConfig {
            url: config.ws_url.clone(),
            reconnect_interval: config.ws_reconnect_interval,
            heartbeat_interval: config.ws_heartbeat_interval,
        }));

        let manager = Arc::new(SessionManager::new(
            registry,
            queue,
            Arc::clone(&epd),
            dispatcher,
            SessionManagerConfig {
                drain_poll_interval: config.drain_poll_interval,
                drain_max_wait: config.drain_max_wait,
                delivery_max_wait: config.delivery_max_wait,
            },
        ));

        epd.on_event(manager.event_callback()).await;
        epd.connect();

        Ok(Arc::new(Self {
            config,
            manager,
            epd,
        }))
    }
}
