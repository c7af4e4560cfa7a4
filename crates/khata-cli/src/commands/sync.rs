//! Sync command - one pipeline pass over a message file

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use khata_core::ai::AiBackend;
use khata_core::budget::BudgetMonitor;
use khata_core::filter::{MemoryMessageStore, MessageFilter, MessageQuery};
use khata_core::models::CandidateMessage;
use khata_core::sync::SyncOrchestrator;
use khata_core::tasks::{InMemoryScheduler, LogSink, NotificationSink};
use khata_core::{AiClient, PipelineConfig, RateLimiter};

use super::open_db;

/// Load a JSONL message file (one CandidateMessage per line).
fn load_messages(path: &Path) -> Result<Vec<CandidateMessage>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut messages = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: CandidateMessage = serde_json::from_str(line)
            .with_context(|| format!("Invalid message on line {}", number + 1))?;
        messages.push(message);
    }
    Ok(messages)
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_sync(
    db_path: &Path,
    file: &Path,
    senders: Vec<String>,
    keywords: Vec<String>,
    ignore_words: Vec<String>,
    since: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let Some(ai) = AiClient::from_env() else {
        bail!(
            "No AI backend configured. Set GEMINI_API_KEY, or KHATA_AI_BACKEND=mock for a dry run."
        );
    };

    let messages = load_messages(file)?;
    println!("📥 Loaded {} messages from {}", messages.len(), file.display());

    let start = match since {
        Some(s) => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid --since date: {}", s))
                .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))?,
        ),
        None => None,
    };

    let query = MessageQuery::new(senders)
        .with_keywords(keywords)
        .with_ignore_words(ignore_words)
        .with_range(start, None);

    let config = PipelineConfig::load();
    let limiter = Arc::new(RateLimiter::from_config(&config.limiter));
    let scheduler = Arc::new(InMemoryScheduler::new());
    let model = ai.model().to_string();
    let orchestrator = SyncOrchestrator::new(
        Arc::new(MemoryMessageStore::new(messages)),
        MessageFilter::new(query),
        ai,
        db.clone(),
        limiter,
        scheduler.clone(),
        config,
    );

    // Ctrl-C cancels cooperatively between items
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n⏹  Cancelling after the current message...");
            ctrl_c_token.cancel();
        }
    });

    println!("🔄 Syncing (model: {})...", model);
    let report = orchestrator.sync_once(&cancel).await?;
    tracing::debug!(state = %report.state, persisted = report.persisted, "Sync run finished");

    println!();
    println!("✅ Sync {}", report.state);
    println!("   Candidates: {}", report.fetched);
    println!("   Persisted: {}", report.persisted);
    println!("   Skipped: {}", report.skipped);

    // Threshold check over the freshly persisted period
    let monitor = BudgetMonitor::new(db, scheduler.clone());
    if monitor.check_current()? {
        println!("   ⚠️  Budget threshold crossed this period");
    }

    // Budget warnings fire immediately; deliver them through the sink
    let sink = LogSink;
    for task in scheduler.take_due(Utc::now()) {
        let title = task.payload["title"].as_str().unwrap_or("Reminder");
        let body = task
            .merchant
            .clone()
            .unwrap_or_else(|| "spending warning".to_string());
        sink.show("khata", title, &body);
    }

    let pending = scheduler.pending_tasks();
    if !pending.is_empty() {
        println!();
        println!("⏰ Reminders this run would schedule:");
        for task in pending {
            match &task.merchant {
                Some(merchant) => {
                    println!("   {} {} at {}", task.kind, merchant, task.fire_at)
                }
                None => println!("   {} at {}", task.kind, task.fire_at),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_messages_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        std::fs::write(
            &path,
            r#"{"id":"1","address":"QNB","body":"QAR 5 at Karak","timestamp":"2026-08-01T09:00:00Z"}

{"id":"2","address":"QNB","body":"QAR 7 at Lulu","timestamp":"2026-08-02T09:00:00Z"}
"#,
        )
        .unwrap();

        let messages = load_messages(&path).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "1");
    }

    #[test]
    fn test_load_messages_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        let err = load_messages(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
