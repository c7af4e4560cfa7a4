//! Gemini backend implementation
//!
//! HTTP client for a generateContent-style API. Extraction calls carry a
//! response schema so the provider returns bare JSON; chat calls are plain
//! text over role-tagged history. All provider failures are mapped into the
//! closed `AiError` taxonomy at this boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AiError, Error, Result};
use crate::models::{CandidateMessage, ChatMessage, ChatRole};

use super::parsing::parse_extraction;
use super::prompts::{extraction_prompt, extraction_response_schema};
use super::types::ExtractedExpense;
use super::AiBackend;

const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini generateContent backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    /// Create a new Gemini backend
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok()?;
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let host = std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Some(Self::new(&host, &api_key, &model))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Send one generateContent request and return the reply text.
    async fn generate(&self, contents: Vec<Content>, schema: Option<Value>) -> Result<String> {
        let request = GenerateRequest {
            contents,
            generation_config: schema.map(|s| GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: Some(s),
            }),
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(map_status_error(status, &body)));
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Ai(AiError::Serialization(format!("Invalid envelope: {}", e))))?;

        extract_reply_text(envelope).map_err(Error::Ai)
    }
}

/// Request to the generateContent API
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

/// Response from the generateContent API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

/// Map transport-level failures (before any HTTP status arrives).
fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Ai(AiError::Timeout)
    } else {
        Error::Ai(AiError::Unknown(e.to_string()))
    }
}

/// Map an unsuccessful HTTP status into the closed taxonomy.
fn map_status_error(status: StatusCode, body: &str) -> AiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiError::InvalidCredentials,
        StatusCode::TOO_MANY_REQUESTS => AiError::QuotaExceeded,
        StatusCode::BAD_REQUEST => {
            if body.contains("API_KEY_INVALID") || body.contains("API key not valid") {
                AiError::InvalidCredentials
            } else if body.contains("User location is not supported") {
                AiError::UnsupportedRegion
            } else {
                AiError::InvalidState(snippet(body))
            }
        }
        s if s.is_server_error() => AiError::Server(format!("{}: {}", s, snippet(body))),
        s => AiError::Unknown(format!("{}: {}", s, snippet(body))),
    }
}

/// Pull the reply text out of a decoded envelope.
fn extract_reply_text(envelope: GenerateResponse) -> std::result::Result<String, AiError> {
    if let Some(feedback) = envelope.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            return Err(AiError::PromptBlocked(reason));
        }
    }

    let candidate = envelope
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AiError::Serialization("Response carried no candidates".into()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            return Err(AiError::ResponseStopped(reason.to_string()));
        }
    }

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AiError::Serialization("Candidate carried no text".into()));
    }
    Ok(text)
}

#[async_trait]
impl AiBackend for GeminiBackend {
    async fn extract_expense(&self, message: &CandidateMessage) -> Result<ExtractedExpense> {
        let contents = vec![Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: extraction_prompt(message),
            }],
        }];

        let reply = self
            .generate(contents, Some(extraction_response_schema()))
            .await?;
        debug!(message_id = %message.id, "Gemini extraction reply: {}", reply);

        parse_extraction(&reply)
    }

    async fn chat(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|m| Content {
                role: match m.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "model".to_string(),
                },
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: message.to_string(),
            }],
        });

        self.generate(contents, None).await
    }

    async fn health_check(&self) -> bool {
        // A schema-free ping with an empty prompt is rejected by the API, so
        // probe the model listing endpoint instead.
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);
        match self
            .http_client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// First line of an error body, truncated for log hygiene.
fn snippet(body: &str) -> String {
    let line = body.lines().next().unwrap_or("");
    if line.len() > 200 {
        format!("{}...", &line[..200])
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AiError::QuotaExceeded
        ));
        assert!(matches!(
            map_status_error(StatusCode::FORBIDDEN, ""),
            AiError::InvalidCredentials
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_REQUEST, r#"{"error": "API_KEY_INVALID"}"#),
            AiError::InvalidCredentials
        ));
        assert!(matches!(
            map_status_error(
                StatusCode::BAD_REQUEST,
                "User location is not supported for the API use."
            ),
            AiError::UnsupportedRegion
        ));
        assert!(matches!(
            map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            AiError::Server(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_REQUEST, "other"),
            AiError::InvalidState(_)
        ));
    }

    #[test]
    fn test_blocked_prompt_maps_to_prompt_blocked() {
        let envelope = GenerateResponse {
            candidates: vec![],
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some("SAFETY".into()),
            }),
        };
        assert!(matches!(
            extract_reply_text(envelope),
            Err(AiError::PromptBlocked(_))
        ));
    }

    #[test]
    fn test_non_stop_finish_reason_maps_to_response_stopped() {
        let envelope = GenerateResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: "model".into(),
                    parts: vec![Part {
                        text: "partial".into(),
                    }],
                }),
                finish_reason: Some("MAX_TOKENS".into()),
            }],
            prompt_feedback: None,
        };
        assert!(matches!(
            extract_reply_text(envelope),
            Err(AiError::ResponseStopped(_))
        ));
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let envelope = GenerateResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: "model".into(),
                    parts: vec![
                        Part { text: "{\"amount\"".into() },
                        Part { text: ": 5}".into() },
                    ],
                }),
                finish_reason: Some("STOP".into()),
            }],
            prompt_feedback: None,
        };
        assert_eq!(extract_reply_text(envelope).unwrap(), "{\"amount\": 5}");
    }
}
