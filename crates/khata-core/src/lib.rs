//! Khata Core Library
//!
//! Shared functionality for the khata bank-SMS expense pipeline:
//! - Message filtering (sender allow-list, keywords, date range)
//! - Sliding-window rate limiting for the AI channel
//! - Schema-constrained generative AI expense extraction
//! - Sync orchestration (cancellable, coalescing, per-item skip semantics)
//! - Recurring-payment detection and reminder scheduling
//! - Budget threshold monitoring
//! - Chat assistant over the shared AI channel
//! - SQLite persistence with optional encryption at rest

pub mod ai;
pub mod budget;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod limiter;
pub mod models;
pub mod recurring;
pub mod sync;
pub mod tasks;

/// Test utilities including the mock generative AI server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AiBackend, AiClient, ExtractedExpense, GeminiBackend, MockBackend};
pub use budget::BudgetMonitor;
pub use chat::ChatAssistant;
pub use config::PipelineConfig;
pub use db::Database;
pub use error::{AiError, Error, Result};
pub use filter::{MemoryMessageStore, MessageFilter, MessageQuery, MessageStore};
pub use limiter::RateLimiter;
pub use recurring::{infer_cadence, RecurringScheduler};
pub use sync::SyncOrchestrator;
pub use tasks::{
    EnqueuePolicy, InMemoryScheduler, LogSink, NotificationSink, ReminderKind, ReminderTask,
    TaskScheduler,
};
