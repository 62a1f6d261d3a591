use std::sync::Arc;
use tokio::sync::Mutex;

use crate::asr::{GoogleRecognizer, RecognitionService};
use crate::audio::{MicrophoneSource, UtteranceSource};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub microphone: Arc<dyn UtteranceSource>,
    pub recognizer: Arc<dyn RecognitionService>,
    /// The input device is a physical exclusive resource; captures for
    /// concurrent requests queue on this lock.
    pub capture_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let api_key = std::env::var("GOOGLE_SPEECH_API_KEY")
            .ok()
            .or_else(|| config.recognizer_config.api_key.clone());

        let recognizer = Arc::new(GoogleRecognizer::new(&config.recognizer_config, api_key)?);
        let microphone = Arc::new(MicrophoneSource::new(
            &config.microphone_config,
            config.recognizer_config.sample_rate,
        ));

        Ok(Self {
            config,
            microphone,
            recognizer,
            capture_lock: Arc::new(Mutex::new(())),
        })
    }

    #[cfg(test)]
    pub fn with_components(
        microphone: Arc<dyn UtteranceSource>,
        recognizer: Arc<dyn RecognitionService>,
    ) -> Self {
        Self {
            config: Config::default(),
            microphone,
            recognizer,
            capture_lock: Arc::new(Mutex::new(())),
        }
    }
}
