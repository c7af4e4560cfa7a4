//! Budget threshold monitoring
//!
//! Compares a period's cumulative spend against its configured budget and
//! raises a one-time warning task when exceeded. The Keep enqueue policy
//! makes repeated checks storm-proof: while a warning is pending, further
//! triggers are ignored.

use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::tasks::{EnqueuePolicy, ReminderKind, ReminderTask, TaskScheduler};

/// Period key ("YYYY-MM") for a date.
pub fn period_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Inclusive date bounds of a "YYYY-MM" period.
pub fn period_bounds(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d")
        .map_err(|_| Error::InvalidData(format!("Invalid budget period: {}", period)))?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| Error::InvalidData(format!("Invalid budget period: {}", period)))?;
    Ok((start, end))
}

/// Checks period spend against the configured budget.
pub struct BudgetMonitor {
    db: Database,
    scheduler: Arc<dyn TaskScheduler>,
}

impl BudgetMonitor {
    pub fn new(db: Database, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { db, scheduler }
    }

    /// Check the current period.
    pub fn check_current(&self) -> Result<bool> {
        self.check(&period_key(Utc::now().date_naive()))
    }

    /// Check one period; returns whether a warning task was enqueued.
    ///
    /// No budget configured for the period means no check. An already
    /// pending warning suppresses new ones (Keep policy), so only the first
    /// crossing of the threshold within a warning's lifetime enqueues.
    pub fn check(&self, period: &str) -> Result<bool> {
        let budget = match self.db.get_budget(period)? {
            Some(budget) => budget,
            None => return Ok(false),
        };

        let (start, end) = period_bounds(period)?;
        let spent = self.db.total_spend(start, end)?;
        if spent < budget.amount {
            debug!(period, spent, budget = budget.amount, "Budget not exceeded");
            return Ok(false);
        }

        let task = ReminderTask {
            kind: ReminderKind::Budget,
            merchant: None,
            fire_at: Utc::now(),
            payload: json!({
                "title": "Budget exceeded",
                "period": period,
                "budget": budget.amount,
                "spent": spent,
            }),
        };
        let name = format!("{}:{}", task.name(), period);
        let stored = self
            .scheduler
            .enqueue_unique(&name, EnqueuePolicy::Keep, task)?;
        if stored {
            info!(period, spent, budget = budget.amount, "Budget warning enqueued");
        }
        Ok(stored)
    }
}
