use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system_config: SystemConfig,
    pub microphone_config: MicrophoneConfig,
    pub recognizer_config: RecognizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Capture-side tuning. The defaults suit a quiet room and an ordinary
/// laptop microphone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneConfig {
    /// Input device name; `None` selects the system default.
    pub device: Option<String>,
    /// Length of the ambient-noise pass run before each capture.
    pub calibration_ms: u64,
    pub frame_ms: u64,
    /// Silence tail that ends a phrase once speech has been heard.
    pub pause_ms: u64,
    pub max_phrase_ms: u64,
    /// How long to wait for speech to start before giving up.
    pub start_timeout_ms: u64,
    pub threshold_margin_db: f32,
    pub threshold_floor_db: f32,
    pub threshold_ceiling_db: f32,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            device: None,
            calibration_ms: 1000,
            frame_ms: 30,
            pause_ms: 800,
            max_phrase_ms: 30_000,
            start_timeout_ms: 8000,
            threshold_margin_db: 6.0,
            threshold_floor_db: -60.0,
            threshold_ceiling_db: -10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub endpoint: String,
    pub language: String,
    /// Rate the captured audio is resampled to before upload.
    pub sample_rate: u32,
    /// Overridden by `GOOGLE_SPEECH_API_KEY` when set.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://speech.googleapis.com/v1/speech:recognize".to_string(),
            language: "en-US".to_string(),
            sample_rate: 16_000,
            api_key: None,
            timeout_secs: 15,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        // Determine file type by extension
        let path_lower = path.to_lowercase();
        if path_lower.ends_with(".json") {
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        }
    }
}
