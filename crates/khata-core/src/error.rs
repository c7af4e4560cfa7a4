//! Error types for khata

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AI provider error: {0}")]
    Ai(#[from] AiError),

    #[error("Message store permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Sync error: {0}")]
    Sync(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed taxonomy of generative AI provider failures.
///
/// Every provider/platform failure the extraction and chat channels can see
/// is mapped into one of these variants at the backend boundary. The
/// orchestrator's retry and skip decisions key off this enum, never off
/// provider-specific error strings.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Response could not be decoded: {0}")]
    Serialization(String),

    #[error("Provider returned a server error: {0}")]
    Server(String),

    #[error("Invalid or missing API credentials")]
    InvalidCredentials,

    #[error("Prompt was blocked by the provider: {0}")]
    PromptBlocked(String),

    #[error("Provider does not serve this region")]
    UnsupportedRegion,

    #[error("Invalid request state: {0}")]
    InvalidState(String),

    #[error("Generation stopped before completion: {0}")]
    ResponseStopped(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request quota exceeded")]
    QuotaExceeded,

    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl AiError {
    /// Whether the orchestrator should re-attempt the call after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::Timeout)
    }

    /// Whether the error invalidates the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidCredentials)
    }
}

impl Error {
    /// Whether this error should fail the sync run instead of one item.
    pub fn is_fatal_to_run(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::Ai(e) => e.is_fatal(),
            _ => false,
        }
    }
}
