//! Deferred task scheduling and notification seams
//!
//! The pipeline never fires reminders itself: it enqueues named tasks with
//! an external scheduler and lets the host deliver them. Names make
//! scheduling idempotent - re-enqueueing the same name either replaces or
//! keeps the pending task depending on policy.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// What a reminder task is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    /// An upcoming recurring charge
    Payment,
    /// A subscription the user wants to cancel before it renews
    Cancellation,
    /// Period spend crossed the configured budget
    Budget,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Cancellation => "cancellation",
            Self::Budget => "budget",
        }
    }
}

impl std::str::FromStr for ReminderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "payment" => Ok(Self::Payment),
            "cancellation" => Ok(Self::Cancellation),
            "budget" => Ok(Self::Budget),
            _ => Err(format!("Unknown reminder kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Enqueue semantics for named deferred tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueuePolicy {
    /// A new request supersedes the pending task of the same name
    Replace,
    /// A new request is ignored while a task of the same name is pending
    Keep,
}

/// A reminder handed to the external scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderTask {
    pub kind: ReminderKind,
    /// Merchant the reminder is about (absent for budget warnings)
    pub merchant: Option<String>,
    pub fire_at: DateTime<Utc>,
    /// Notification payload (title/body/extra fields as JSON)
    pub payload: serde_json::Value,
}

impl ReminderTask {
    /// Canonical task name: one pending task per (kind, merchant).
    pub fn name(&self) -> String {
        match &self.merchant {
            Some(merchant) => format!("{}:{}", self.kind, merchant.to_lowercase()),
            None => self.kind.to_string(),
        }
    }
}

/// External deferred-task scheduler contract.
///
/// `enqueue_unique` returns whether the task was stored (false when a Keep
/// policy suppressed it). Implementations own the task once stored.
pub trait TaskScheduler: Send + Sync {
    fn enqueue_unique(
        &self,
        name: &str,
        policy: EnqueuePolicy,
        task: ReminderTask,
    ) -> Result<bool>;
}

/// External notification contract. Fire-and-forget, never awaited.
pub trait NotificationSink: Send + Sync {
    fn show(&self, channel: &str, title: &str, body: &str);
}

/// In-memory scheduler for tests and the CLI harness.
#[derive(Default)]
pub struct InMemoryScheduler {
    tasks: Mutex<HashMap<String, ReminderTask>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending task under a name, if any.
    pub fn pending(&self, name: &str) -> Option<ReminderTask> {
        self.tasks
            .lock()
            .map(|tasks| tasks.get(name).cloned())
            .unwrap_or(None)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// All pending tasks, ordered by fire time.
    pub fn pending_tasks(&self) -> Vec<ReminderTask> {
        let mut tasks: Vec<ReminderTask> = self
            .tasks
            .lock()
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by_key(|t| t.fire_at);
        tasks
    }

    /// Remove and return tasks due at or before `now` (consuming them).
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ReminderTask> {
        let mut due = Vec::new();
        if let Ok(mut tasks) = self.tasks.lock() {
            let names: Vec<String> = tasks
                .iter()
                .filter(|(_, t)| t.fire_at <= now)
                .map(|(name, _)| name.clone())
                .collect();
            for name in names {
                if let Some(task) = tasks.remove(&name) {
                    due.push(task);
                }
            }
        }
        due.sort_by_key(|t| t.fire_at);
        due
    }
}

impl TaskScheduler for InMemoryScheduler {
    fn enqueue_unique(
        &self,
        name: &str,
        policy: EnqueuePolicy,
        task: ReminderTask,
    ) -> Result<bool> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| crate::error::Error::Sync("scheduler lock poisoned".into()))?;

        if tasks.contains_key(name) && policy == EnqueuePolicy::Keep {
            return Ok(false);
        }
        tasks.insert(name.to_string(), task);
        Ok(true)
    }
}

/// Notification sink that only logs (useful headless).
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, channel: &str, title: &str, body: &str) {
        info!(channel, title, body, "notification");
    }
}
