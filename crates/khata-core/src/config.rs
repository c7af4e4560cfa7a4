//! Pipeline configuration
//!
//! Throttle, retry, and reminder policy for the sync pipeline.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/khata/config/pipeline.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

/// Rate limiter parameters for the AI channel
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum requests admitted per trailing window
    pub max_requests: usize,
    /// Trailing window length
    pub window: Duration,
    /// Fixed pause between consecutive extraction calls
    pub base_delay: Duration,
}

/// Sync run policy
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cap on messages processed per run
    pub max_items_per_run: usize,
    /// Re-attempts for retryable AI errors before skipping the message
    pub max_retries: u32,
    /// Initial backoff between re-attempts; doubles per attempt
    pub retry_backoff: Duration,
}

/// Reminder scheduling leads
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Days before the next recurring date to fire a payment reminder
    pub payment_lead_days: i64,
    /// Days before the next recurring date to fire a cancellation reminder
    pub cancellation_lead_days: i64,
}

/// Chat assistant context sizing
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Recent expenses included as context
    pub context_expenses: usize,
}

/// Full pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub limiter: LimiterConfig,
    pub sync: SyncConfig,
    pub reminders: ReminderConfig,
    pub chat: ChatConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // The embedded config is validated by tests; a parse failure here
        // would be a build defect, so fall back to hard defaults silently.
        Self::from_toml(DEFAULT_CONFIG).unwrap_or(Self {
            limiter: LimiterConfig {
                max_requests: 10,
                window: Duration::from_secs(60),
                base_delay: Duration::from_millis(2000),
            },
            sync: SyncConfig {
                max_items_per_run: 10,
                max_retries: 2,
                retry_backoff: Duration::from_millis(1000),
            },
            reminders: ReminderConfig {
                payment_lead_days: 1,
                cancellation_lead_days: 3,
            },
            chat: ChatConfig {
                context_expenses: 15,
            },
        })
    }
}

impl PipelineConfig {
    /// Load config with override resolution.
    ///
    /// An unreadable or invalid override logs a warning and falls back to
    /// the embedded defaults rather than failing the host.
    pub fn load() -> Self {
        if let Some(path) = Self::override_path() {
            if path.exists() {
                match fs::read_to_string(&path) {
                    Ok(contents) => match Self::from_toml(&contents) {
                        Ok(config) => return config,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Invalid pipeline config override, using defaults");
                        }
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Unreadable pipeline config override, using defaults");
                    }
                }
            }
        }
        Self::default()
    }

    /// Parse a TOML config document. Missing sections fall back to defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents)
            .map_err(|e| crate::error::Error::Config(format!("Invalid pipeline config: {}", e)))?;

        let base = Self::base_defaults();
        let limiter = raw.limiter.unwrap_or_default();
        let sync = raw.sync.unwrap_or_default();
        let reminders = raw.reminders.unwrap_or_default();
        let chat = raw.chat.unwrap_or_default();

        Ok(Self {
            limiter: LimiterConfig {
                max_requests: limiter.max_requests.unwrap_or(base.limiter.max_requests),
                window: limiter
                    .window_secs
                    .map(Duration::from_secs)
                    .unwrap_or(base.limiter.window),
                base_delay: limiter
                    .base_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.limiter.base_delay),
            },
            sync: SyncConfig {
                max_items_per_run: sync
                    .max_items_per_run
                    .unwrap_or(base.sync.max_items_per_run),
                max_retries: sync.max_retries.unwrap_or(base.sync.max_retries),
                retry_backoff: sync
                    .retry_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.sync.retry_backoff),
            },
            reminders: ReminderConfig {
                payment_lead_days: reminders
                    .payment_lead_days
                    .unwrap_or(base.reminders.payment_lead_days),
                cancellation_lead_days: reminders
                    .cancellation_lead_days
                    .unwrap_or(base.reminders.cancellation_lead_days),
            },
            chat: ChatConfig {
                context_expenses: chat
                    .context_expenses
                    .unwrap_or(base.chat.context_expenses),
            },
        })
    }

    /// Hard-coded fallback used when a raw key is absent.
    fn base_defaults() -> Self {
        Self {
            limiter: LimiterConfig {
                max_requests: 10,
                window: Duration::from_secs(60),
                base_delay: Duration::from_millis(2000),
            },
            sync: SyncConfig {
                max_items_per_run: 10,
                max_retries: 2,
                retry_backoff: Duration::from_millis(1000),
            },
            reminders: ReminderConfig {
                payment_lead_days: 1,
                cancellation_lead_days: 3,
            },
            chat: ChatConfig {
                context_expenses: 15,
            },
        }
    }

    /// Path to the user override file
    fn override_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("khata").join("config").join("pipeline.toml"))
    }
}

/// Raw TOML shape (all keys optional)
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    limiter: Option<RawLimiter>,
    sync: Option<RawSync>,
    reminders: Option<RawReminders>,
    chat: Option<RawChat>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimiter {
    max_requests: Option<usize>,
    window_secs: Option<u64>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSync {
    max_items_per_run: Option<usize>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReminders {
    payment_lead_days: Option<i64>,
    cancellation_lead_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChat {
    context_expenses: Option<usize>,
}
