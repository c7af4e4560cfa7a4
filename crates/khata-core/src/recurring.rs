//! Recurring-payment detection and reminder scheduling
//!
//! Advances the recurrence state of persisted expenses (next due date per
//! cadence), infers a cadence from a merchant's payment history, and hands
//! reminder tasks to the external scheduler. Scheduling is idempotent per
//! (kind, merchant): a re-schedule replaces the pending reminder.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::config::ReminderConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Expense, RecurringType};
use crate::tasks::{EnqueuePolicy, ReminderKind, ReminderTask, TaskScheduler};

/// Minimum payment count before a cadence is inferred from history.
const MIN_OCCURRENCES: usize = 3;

/// Classify a day gap into a cadence, with per-cadence tolerance.
fn classify_gap(days: i64) -> Option<RecurringType> {
    match days {
        1 => Some(RecurringType::Daily),
        5..=9 => Some(RecurringType::Weekly),
        25..=35 => Some(RecurringType::Monthly),
        350..=380 => Some(RecurringType::Yearly),
        _ => None,
    }
}

/// Infer a recurrence cadence from a merchant's payment dates.
///
/// Dates must be sorted ascending. Requires at least `MIN_OCCURRENCES`
/// payments and every inter-payment gap to classify into the same cadence;
/// anything noisier yields `None` rather than a guess.
pub fn infer_cadence(dates: &[NaiveDate]) -> Option<RecurringType> {
    if dates.len() < MIN_OCCURRENCES {
        return None;
    }

    let mut cadence: Option<RecurringType> = None;
    for pair in dates.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        let classified = classify_gap(gap)?;
        match cadence {
            None => cadence = Some(classified),
            Some(existing) if existing != classified => return None,
            Some(_) => {}
        }
    }
    cadence
}

/// Advances recurrence state and schedules reminders.
pub struct RecurringScheduler {
    db: Database,
    scheduler: Arc<dyn TaskScheduler>,
    config: ReminderConfig,
}

impl RecurringScheduler {
    pub fn new(db: Database, scheduler: Arc<dyn TaskScheduler>, config: ReminderConfig) -> Self {
        Self {
            db,
            scheduler,
            config,
        }
    }

    /// Advance one persisted expense's recurrence state.
    ///
    /// Computes and persists `next_recurring_date = payment_date + cadence`,
    /// then schedules the appropriate reminder. No-op for non-recurring
    /// expenses. Returns the next date when one was set.
    pub fn process_expense(&self, expense: &Expense) -> Result<Option<NaiveDate>> {
        self.process_expense_at(expense, Utc::now())
    }

    /// Test seam: `now` bounds the never-fire-retroactively rule.
    pub fn process_expense_at(
        &self,
        expense: &Expense,
        now: DateTime<Utc>,
    ) -> Result<Option<NaiveDate>> {
        let next = match expense.recurring_type.advance(expense.payment_date) {
            Some(next) => next,
            None => return Ok(None),
        };

        self.db
            .update_recurring(expense.id, expense.recurring_type, Some(next))?;
        debug!(
            merchant = %expense.merchant,
            cadence = %expense.recurring_type,
            next = %next,
            "Advanced recurrence"
        );

        self.schedule_reminder(expense, next, now)?;
        Ok(Some(next))
    }

    /// Re-derive a merchant's cadence from payment history.
    ///
    /// When inference disagrees with the stored hint on the newest expense,
    /// the stored cadence is upgraded and reminders are rescheduled. Returns
    /// the inferred cadence, if any.
    pub fn refresh_merchant(&self, merchant: &str) -> Result<Option<RecurringType>> {
        self.refresh_merchant_at(merchant, Utc::now())
    }

    pub fn refresh_merchant_at(
        &self,
        merchant: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RecurringType>> {
        let history = self.db.expenses_for_merchant(merchant)?;
        let dates: Vec<NaiveDate> = history.iter().map(|e| e.payment_date).collect();

        let cadence = match infer_cadence(&dates) {
            Some(cadence) => cadence,
            None => return Ok(None),
        };

        let newest = match history.last() {
            Some(newest) => newest,
            None => return Ok(None),
        };

        if newest.recurring_type != cadence {
            info!(
                merchant = %merchant,
                from = %newest.recurring_type,
                to = %cadence,
                "Cadence inferred from history"
            );
        }

        let mut updated = newest.clone();
        updated.recurring_type = cadence;
        self.process_expense_at(&updated, now)?;
        Ok(Some(cadence))
    }

    /// Schedule the payment or cancellation reminder for a recurrence.
    ///
    /// A computed fire time that is not strictly in the future schedules
    /// nothing - reminders never fire retroactively.
    fn schedule_reminder(
        &self,
        expense: &Expense,
        next: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (kind, lead_days) = if expense.to_be_cancelled {
            (ReminderKind::Cancellation, self.config.cancellation_lead_days)
        } else {
            (ReminderKind::Payment, self.config.payment_lead_days)
        };

        let fire_at = reminder_fire_at(next, lead_days);
        if fire_at <= now {
            debug!(
                merchant = %expense.merchant,
                kind = %kind,
                fire_at = %fire_at,
                "Computed reminder time already passed, skipping"
            );
            return Ok(());
        }

        let title = match kind {
            ReminderKind::Cancellation => format!("Cancel {} before it renews", expense.merchant),
            _ => format!("{} payment due soon", expense.merchant),
        };
        let task = ReminderTask {
            kind,
            merchant: Some(expense.merchant.clone()),
            fire_at,
            payload: json!({
                "title": title,
                "merchant": expense.merchant,
                "amount": expense.amount,
                "currency": expense.currency.as_str(),
                "due": next.to_string(),
            }),
        };

        let stored = self
            .scheduler
            .enqueue_unique(&task.name(), EnqueuePolicy::Replace, task)?;
        if stored {
            info!(merchant = %expense.merchant, kind = %kind, fire_at = %fire_at, "Reminder scheduled");
        }
        Ok(())
    }
}

/// Reminders fire at midnight UTC, `lead_days` before the due date.
fn reminder_fire_at(next: NaiveDate, lead_days: i64) -> DateTime<Utc> {
    (next - Duration::days(lead_days))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Currency, NewExpense, PaymentStatus};
    use crate::tasks::InMemoryScheduler;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scheduler_under_test(db: &Database) -> (RecurringScheduler, Arc<InMemoryScheduler>) {
        let tasks = Arc::new(InMemoryScheduler::new());
        let config = ReminderConfig {
            payment_lead_days: 1,
            cancellation_lead_days: 3,
        };
        (
            RecurringScheduler::new(db.clone(), tasks.clone(), config),
            tasks,
        )
    }

    fn insert(db: &Database, merchant: &str, day: (i32, u32, u32), hash: &str) -> Expense {
        let id = db
            .insert_expense(&NewExpense {
                amount: 39.0,
                currency: Currency::Qar,
                merchant: merchant.into(),
                category: Category::Entertainment,
                payment_status: PaymentStatus::Paid,
                recurring_type: RecurringType::Monthly,
                payment_date: date(day.0, day.1, day.2),
                due_date: None,
                source_hash: hash.into(),
            })
            .unwrap()
            .unwrap();
        db.get_expense(id).unwrap()
    }

    #[test]
    fn test_infer_cadence_monthly() {
        let dates = [date(2026, 3, 5), date(2026, 4, 5), date(2026, 5, 5)];
        assert_eq!(infer_cadence(&dates), Some(RecurringType::Monthly));
    }

    #[test]
    fn test_infer_cadence_weekly_with_jitter() {
        let dates = [
            date(2026, 3, 2),
            date(2026, 3, 9),
            date(2026, 3, 17),
            date(2026, 3, 23),
        ];
        assert_eq!(infer_cadence(&dates), Some(RecurringType::Weekly));
    }

    #[test]
    fn test_infer_cadence_yearly() {
        let dates = [date(2024, 1, 10), date(2025, 1, 9), date(2026, 1, 12)];
        assert_eq!(infer_cadence(&dates), Some(RecurringType::Yearly));
    }

    #[test]
    fn test_infer_cadence_needs_three_payments() {
        let dates = [date(2026, 3, 5), date(2026, 4, 5)];
        assert_eq!(infer_cadence(&dates), None);
    }

    #[test]
    fn test_infer_cadence_rejects_mixed_gaps() {
        let dates = [date(2026, 3, 5), date(2026, 3, 12), date(2026, 4, 12)];
        assert_eq!(infer_cadence(&dates), None);
    }

    #[test]
    fn test_process_expense_persists_next_date_and_schedules() {
        let db = Database::in_memory().unwrap();
        let (recurring, tasks) = scheduler_under_test(&db);
        let expense = insert(&db, "Netflix", (2026, 8, 1), "h1");

        let now = Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap();
        let next = recurring.process_expense_at(&expense, now).unwrap();
        assert_eq!(next, Some(date(2026, 9, 1)));
        assert_eq!(
            db.get_expense(expense.id).unwrap().next_recurring_date,
            Some(date(2026, 9, 1))
        );

        let task = tasks.pending("payment:netflix").unwrap();
        assert_eq!(task.kind, ReminderKind::Payment);
        // Lead of 1 day before Sep 1, midnight UTC
        assert_eq!(
            task.fire_at,
            Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cancellation_reminder_uses_cancellation_lead() {
        let db = Database::in_memory().unwrap();
        let (recurring, tasks) = scheduler_under_test(&db);
        let mut expense = insert(&db, "OSN", (2026, 8, 10), "h1");
        db.set_to_be_cancelled("OSN", true).unwrap();
        expense.to_be_cancelled = true;

        let now = Utc.with_ymd_and_hms(2026, 8, 11, 0, 0, 0).unwrap();
        recurring.process_expense_at(&expense, now).unwrap();

        assert!(tasks.pending("payment:osn").is_none());
        let task = tasks.pending("cancellation:osn").unwrap();
        // 3 days before Sep 10
        assert_eq!(
            task.fire_at,
            Utc.with_ymd_and_hms(2026, 9, 7, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_past_fire_time_schedules_nothing() {
        let db = Database::in_memory().unwrap();
        let (recurring, tasks) = scheduler_under_test(&db);
        let expense = insert(&db, "Netflix", (2026, 8, 1), "h1");

        // "now" is already past the computed fire time (Aug 31)
        let now = Utc.with_ymd_and_hms(2026, 9, 15, 0, 0, 0).unwrap();
        let next = recurring.process_expense_at(&expense, now).unwrap();
        // Next date still persisted, but nothing scheduled
        assert_eq!(next, Some(date(2026, 9, 1)));
        assert_eq!(tasks.pending_count(), 0);
    }

    #[test]
    fn test_reschedule_replaces_pending_reminder() {
        let db = Database::in_memory().unwrap();
        let (recurring, tasks) = scheduler_under_test(&db);
        let first = insert(&db, "Netflix", (2026, 8, 1), "h1");
        let second = insert(&db, "Netflix", (2026, 9, 1), "h2");

        let now = Utc.with_ymd_and_hms(2026, 9, 2, 0, 0, 0).unwrap();
        recurring.process_expense_at(&first, now).unwrap();
        recurring.process_expense_at(&second, now).unwrap();

        assert_eq!(tasks.pending_count(), 1);
        let task = tasks.pending("payment:netflix").unwrap();
        // Replaced by the September charge: due Oct 1, fires Sep 30
        assert_eq!(
            task.fire_at,
            Utc.with_ymd_and_hms(2026, 9, 30, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_refresh_merchant_upgrades_cadence_from_history() {
        let db = Database::in_memory().unwrap();
        let (recurring, _tasks) = scheduler_under_test(&db);

        // Three monthly charges persisted without a recurrence hint
        for (i, day) in [(2026, 5, 3), (2026, 6, 3), (2026, 7, 3)].iter().enumerate() {
            let expense = insert(&db, "Spotify", *day, &format!("h{}", i));
            db.update_recurring(expense.id, RecurringType::None, None)
                .unwrap();
        }

        let now = Utc.with_ymd_and_hms(2026, 7, 4, 0, 0, 0).unwrap();
        let inferred = recurring.refresh_merchant_at("Spotify", now).unwrap();
        assert_eq!(inferred, Some(RecurringType::Monthly));

        // Newest expense upgraded: monthly, next = d + 3mo from the first
        let history = db.expenses_for_merchant("Spotify").unwrap();
        let newest = history.last().unwrap();
        assert_eq!(newest.recurring_type, RecurringType::Monthly);
        assert_eq!(newest.next_recurring_date, Some(date(2026, 8, 3)));
    }
}
