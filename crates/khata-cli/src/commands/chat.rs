//! Chat assistant command

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use khata_core::{AiClient, ChatAssistant, PipelineConfig, RateLimiter};

use super::open_db;

pub async fn cmd_chat(db_path: &Path, message: &str, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let Some(ai) = AiClient::from_env() else {
        bail!(
            "No AI backend configured. Set GEMINI_API_KEY, or KHATA_AI_BACKEND=mock for a dry run."
        );
    };

    let config = PipelineConfig::load();
    let limiter = Arc::new(RateLimiter::from_config(&config.limiter));
    let assistant = ChatAssistant::new(db, ai, limiter, config.chat);

    let reply = assistant.ask(message).await?;
    println!("{}", reply);

    Ok(())
}
