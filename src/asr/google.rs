//! Client for the Google Cloud Speech `speech:recognize` REST surface.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::interface::{RecognitionError, RecognitionService};
use crate::audio::Utterance;
use crate::config::RecognizerConfig;

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    /// Base64 LINEAR16 payload.
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    transcript: Option<String>,
}

pub struct GoogleRecognizer {
    client: Client,
    endpoint: String,
    language: String,
    api_key: Option<String>,
}

impl GoogleRecognizer {
    pub fn new(cfg: &RecognizerConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            language: cfg.language.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl RecognitionService for GoogleRecognizer {
    async fn recognize(&self, utterance: &Utterance) -> Result<String, RecognitionError> {
        let body = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: utterance.sample_rate,
                language_code: &self.language,
            },
            audio: RecognitionAudio {
                content: encode_linear16(&utterance.samples),
            },
        };

        debug!(
            "sending {} ms of audio for recognition",
            utterance.duration_ms()
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecognitionError::Request(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Request(anyhow::anyhow!(
                "service returned {status}: {detail}"
            )));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::Request(e.into()))?;

        first_transcript(parsed).ok_or(RecognitionError::NoMatch)
    }
}

/// f32 PCM in `[-1.0, 1.0]` to base64 little-endian LINEAR16.
fn encode_linear16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32_767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// The top alternative of the first result; `None` means the service heard
/// audio but produced no text.
fn first_transcript(response: RecognizeResponse) -> Option<String> {
    response
        .results
        .into_iter()
        .flat_map(|result| result.alternatives)
        .find_map(|alternative| alternative.transcript)
        .filter(|transcript| !transcript.trim().is_empty())
}
