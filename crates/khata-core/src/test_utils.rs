//! Test utilities for khata-core
//!
//! Provides a mock generateContent server so integration tests can exercise
//! the real HTTP backend, including its provider-error mapping, without a
//! network or credentials.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Failure modes the mock server can be forced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// 429 Too Many Requests
    Quota,
    /// 500 Internal Server Error
    ServerError,
    /// 200 with promptFeedback.blockReason and no candidates
    Blocked,
    /// 200 with finishReason = MAX_TOKENS
    Stopped,
    /// 400 with an API_KEY_INVALID error body
    BadApiKey,
}

#[derive(Default)]
struct MockState {
    forced: Mutex<Option<MockFailure>>,
}

/// Mock generateContent server for testing and development.
pub struct MockAiServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockAiServer {
    /// Start the mock server on an available port.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/v1beta/models/:model", get(handle_model_info).post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Force every subsequent request into a failure mode.
    pub fn force(&self, failure: MockFailure) {
        if let Ok(mut forced) = self.state.forced.lock() {
            *forced = Some(failure);
        }
    }

    /// Clear any forced failure mode.
    pub fn reset(&self) {
        if let Ok(mut forced) = self.state.forced.lock() {
            *forced = None;
        }
    }

    /// Stop the mock server.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockAiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Model info endpoint (health checks).
async fn handle_model_info() -> Json<Value> {
    Json(json!({ "name": "models/mock", "displayName": "Mock Model" }))
}

/// generateContent endpoint.
///
/// Extraction prompts (detected by the "Message:" template line) get a
/// canned expense JSON; anything else gets a plain text reply.
async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(request): Json<Value>,
) -> Response {
    let forced = state.forced.lock().ok().and_then(|f| *f);
    if let Some(failure) = forced {
        return failure_response(failure);
    }

    let prompt = request["contents"]
        .as_array()
        .and_then(|contents| contents.last())
        .and_then(|content| content["parts"][0]["text"].as_str())
        .unwrap_or_default();

    let text = if prompt.contains("Message:") {
        json!({
            "amount": 42.5,
            "currency": "QAR",
            "merchant": "Mock Mart",
            "category": "grocery",
            "payment_status": "paid",
            "recurring_type": "none",
            "payment_date": "2025-11-10"
        })
        .to_string()
    } else {
        "This is a mock assistant reply.".to_string()
    };

    Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
    .into_response()
}

fn failure_response(failure: MockFailure) -> Response {
    match failure {
        MockFailure::Quota => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "code": 429, "status": "RESOURCE_EXHAUSTED" } })),
        )
            .into_response(),
        MockFailure::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": 500, "status": "INTERNAL" } })),
        )
            .into_response(),
        MockFailure::Blocked => Json(json!({
            "candidates": [],
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .into_response(),
        MockFailure::Stopped => Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "{\"amou" }] },
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .into_response(),
        MockFailure::BadApiKey => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{ "reason": "API_KEY_INVALID" }]
                }
            })),
        )
            .into_response(),
    }
}
