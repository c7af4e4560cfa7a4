//! Pluggable generative AI backend abstraction
//!
//! Backend-agnostic interface for the two AI operations the pipeline needs:
//! schema-constrained expense extraction and conversational Q&A. Both share
//! one rate-limited channel and the same closed error taxonomy.
//!
//! # Architecture
//!
//! - `AiBackend` trait: defines the interface for AI operations
//! - `AiClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `KHATA_AI_BACKEND`: Backend to use (gemini, mock). Default: gemini
//! - `GEMINI_API_KEY`: API key (required for gemini backend)
//! - `GEMINI_MODEL`: Model name (default: gemini-1.5-flash)
//! - `GEMINI_HOST`: API host override (for proxies and tests)

mod gemini;
mod mock;
pub mod parsing;
pub mod prompts;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use types::ExtractedExpense;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CandidateMessage, ChatMessage};

/// Trait defining the interface for AI backends
///
/// Backends must be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Extract a structured expense draft from one bank message.
    async fn extract_expense(&self, message: &CandidateMessage) -> Result<ExtractedExpense>;

    /// Answer a conversational question given prior history.
    async fn chat(&self, history: &[ChatMessage], message: &str) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AiClient {
    /// Gemini-style generateContent HTTP API
    Gemini(GeminiBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AiClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `KHATA_AI_BACKEND` to determine which backend to use:
    /// - `gemini` (default): Uses GEMINI_API_KEY / GEMINI_MODEL / GEMINI_HOST
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("KHATA_AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" => GeminiBackend::from_env().map(AiClient::Gemini),
            "mock" => Some(AiClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown KHATA_AI_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(AiClient::Gemini)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AiClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl AiBackend for AiClient {
    async fn extract_expense(&self, message: &CandidateMessage) -> Result<ExtractedExpense> {
        match self {
            AiClient::Gemini(b) => b.extract_expense(message).await,
            AiClient::Mock(b) => b.extract_expense(message).await,
        }
    }

    async fn chat(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        match self {
            AiClient::Gemini(b) => b.chat(history, message).await,
            AiClient::Mock(b) => b.chat(history, message).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AiClient::Gemini(b) => b.health_check().await,
            AiClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AiClient::Gemini(b) => b.model(),
            AiClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AiClient::Gemini(b) => b.host(),
            AiClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AiClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AiClient::mock();
        assert!(client.health_check().await);
    }
}
