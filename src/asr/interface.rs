use async_trait::async_trait;
use thiserror::Error;

use crate::audio::Utterance;

/// The two failure kinds the endpoint absorbs into fixed messages. Anything
/// the service cannot express as one of these surfaces as `Request`.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The service understood the signal as audio but produced no text.
    #[error("speech was unintelligible")]
    NoMatch,

    /// Transport, authentication, or service-side failure.
    #[error("recognition request failed: {0}")]
    Request(#[from] anyhow::Error),
}

#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Transcribe one utterance, blocking the caller until the remote call
    /// returns or fails.
    async fn recognize(&self, utterance: &Utterance) -> Result<String, RecognitionError>;
}
