use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::asr::RecognitionError;
use crate::audio::Recorder;
use crate::state::AppState;

/// Returned when the service heard audio but produced no text.
pub const NO_MATCH_MESSAGE: &str = "Sorry, I couldn't understand what you said.";
/// Returned when the recognition request failed for any other reason.
pub const REQUEST_ERROR_MESSAGE: &str = "Sorry, there was an error processing your request.";

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/api/health", get(health_check))
        // Recognition endpoint
        .route("/recognize-speech", post(recognize_speech))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "input_device": Recorder::input_device_available(),
        "language": state.config.recognizer_config.language
    }))
}

/// Records one utterance from the local microphone and answers with the
/// transcript, or with one of the two fixed error strings. Any request body
/// is ignored; audio always comes from the server's own input device.
async fn recognize_speech(
    State(state): State<AppState>,
) -> Result<String, (StatusCode, Json<Value>)> {
    let utterance = {
        // Hold the lock for the whole capture so concurrent requests queue
        // instead of racing on the open device.
        let _guard = state.capture_lock.lock().await;
        let source = state.microphone.clone();
        tokio::task::spawn_blocking(move || source.capture_utterance())
            .await
            .map_err(|e| capture_fault(anyhow::anyhow!("capture task failed: {e}")))?
            .map_err(|e| capture_fault(e.into()))?
    };

    if utterance.is_empty() {
        info!("no speech detected before the start timeout");
        return Ok(NO_MATCH_MESSAGE.to_string());
    }

    match state.recognizer.recognize(&utterance).await {
        Ok(transcript) => {
            info!("transcribed {} ms of audio", utterance.duration_ms());
            Ok(transcript)
        }
        Err(RecognitionError::NoMatch) => {
            info!("recognizer produced no match");
            Ok(NO_MATCH_MESSAGE.to_string())
        }
        Err(RecognitionError::Request(err)) => {
            warn!("recognition request failed: {err:#}");
            Ok(REQUEST_ERROR_MESSAGE.to_string())
        }
    }
}

fn capture_fault(err: anyhow::Error) -> (StatusCode, Json<Value>) {
    warn!("audio capture failed: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("audio capture failed: {err}")})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::RecognitionService;
    use crate::audio::{CaptureError, Utterance, UtteranceSource};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_http::cors::CorsLayer;

    enum SourceScript {
        Speech,
        Silence,
        Fail,
    }

    struct ScriptedSource(SourceScript);

    impl UtteranceSource for ScriptedSource {
        fn capture_utterance(&self) -> Result<Utterance, CaptureError> {
            match self.0 {
                SourceScript::Speech => Ok(Utterance {
                    samples: vec![0.1; 1600],
                    sample_rate: 16_000,
                }),
                SourceScript::Silence => Ok(Utterance {
                    samples: Vec::new(),
                    sample_rate: 16_000,
                }),
                SourceScript::Fail => Err(CaptureError::NoDevice),
            }
        }
    }

    enum RecognizerScript {
        Transcript(&'static str),
        NoMatch,
        RequestFailure,
    }

    struct ScriptedRecognizer(RecognizerScript);

    #[async_trait]
    impl RecognitionService for ScriptedRecognizer {
        async fn recognize(&self, _utterance: &Utterance) -> Result<String, RecognitionError> {
            match self.0 {
                RecognizerScript::Transcript(text) => Ok(text.to_string()),
                RecognizerScript::NoMatch => Err(RecognitionError::NoMatch),
                RecognizerScript::RequestFailure => {
                    Err(RecognitionError::Request(anyhow::anyhow!(
                        "service unreachable"
                    )))
                }
            }
        }
    }

    fn app(source: SourceScript, recognizer: RecognizerScript) -> Router {
        let state = AppState::with_components(
            Arc::new(ScriptedSource(source)),
            Arc::new(ScriptedRecognizer(recognizer)),
        );
        create_routes()
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    fn recognize_request() -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/recognize-speech")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn transcript_passes_through_verbatim() {
        let app = app(
            SourceScript::Speech,
            RecognizerScript::Transcript("add expense fifty dollars"),
        );
        let response = app.oneshot(recognize_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "add expense fifty dollars");
    }

    #[tokio::test]
    async fn no_match_returns_the_fixed_message() {
        let app = app(SourceScript::Speech, RecognizerScript::NoMatch);
        let response = app.oneshot(recognize_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, NO_MATCH_MESSAGE);
    }

    #[tokio::test]
    async fn request_failure_returns_the_fixed_message() {
        let app = app(SourceScript::Speech, RecognizerScript::RequestFailure);
        let response = app.oneshot(recognize_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, REQUEST_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn silence_skips_the_remote_service() {
        // The recognizer would fail if consulted; silence must short-circuit.
        let app = app(SourceScript::Silence, RecognizerScript::RequestFailure);
        let response = app.oneshot(recognize_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, NO_MATCH_MESSAGE);
    }

    #[tokio::test]
    async fn capture_failure_is_a_server_error() {
        let app = app(SourceScript::Fail, RecognizerScript::Transcript("unused"));
        let response = app.oneshot(recognize_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("audio capture failed"));
    }

    #[tokio::test]
    async fn get_on_the_recognition_path_is_rejected() {
        let app = app(SourceScript::Speech, RecognizerScript::Transcript("hi"));
        let request = Request::builder()
            .method(Method::GET)
            .uri("/recognize-speech")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn cross_origin_requests_are_allowed() {
        let app = app(SourceScript::Speech, RecognizerScript::Transcript("hi"));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/recognize-speech")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app(SourceScript::Speech, RecognizerScript::Transcript("hi"));
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
    }
}
