//! Sliding-window rate limiter for the AI channel
//!
//! Bounds extraction/chat requests to `max_requests` per trailing `window`.
//! One limiter instance is shared by every caller that touches the AI
//! service; the sync orchestrator layers a fixed inter-request delay on top.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::LimiterConfig;

/// Admission gate over a trailing request window.
///
/// `admit()` suspends the caller until a new request is safe, then records
/// it. Timestamps live only for the process lifetime.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            // A zero-request window would never admit anyone.
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    /// Wait until a request is admissible, then record it.
    ///
    /// Drops timestamps older than the trailing window; if the window is
    /// full, sleeps until the oldest entry expires. The lock is released
    /// while sleeping so the wait never blocks observers.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) >= self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }

                match timestamps.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            if wait > Duration::ZERO {
                debug!(wait_ms = wait.as_millis() as u64, "Rate limiter window full, waiting");
                sleep(wait).await;
            }
        }
    }

    /// Requests currently inside the trailing window.
    pub async fn in_flight(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        timestamps.len()
    }
}
