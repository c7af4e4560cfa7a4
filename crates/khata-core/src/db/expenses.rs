//! Expense operations

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Expense, NewExpense, RecurringType};

/// Columns selected for every expense row, in `map_expense_row` order.
const EXPENSE_COLUMNS: &str = "id, amount, currency, merchant, category, payment_status, \
     recurring_type, payment_date, due_date, next_recurring_date, to_be_cancelled, \
     source_hash, created_at";

fn map_expense_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    let currency: String = row.get(2)?;
    let category: String = row.get(4)?;
    let payment_status: String = row.get(5)?;
    let recurring_type: String = row.get(6)?;
    let payment_date: String = row.get(7)?;
    let due_date: Option<String> = row.get(8)?;
    let next_recurring_date: Option<String> = row.get(9)?;
    let created_at: String = row.get(12)?;

    Ok(Expense {
        id: row.get(0)?,
        amount: row.get(1)?,
        currency: currency.parse().unwrap_or_default(),
        merchant: row.get(3)?,
        category: category.parse().unwrap_or_default(),
        payment_status: payment_status.parse().unwrap_or_default(),
        recurring_type: recurring_type.parse().unwrap_or_default(),
        payment_date: NaiveDate::parse_from_str(&payment_date, "%Y-%m-%d")
            .unwrap_or_default(),
        due_date: due_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        next_recurring_date: next_recurring_date
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        to_be_cancelled: row.get(10)?,
        source_hash: row.get(11)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Insert a new expense.
    ///
    /// Returns `None` when an expense with the same source hash already
    /// exists - re-ingesting a message is a persisted no-op.
    pub fn insert_expense(&self, new: &NewExpense) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO expenses
                (amount, currency, merchant, category, payment_status, recurring_type,
                 payment_date, due_date, source_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new.amount,
                new.currency.as_str(),
                new.merchant,
                new.category.as_str(),
                new.payment_status.as_str(),
                new.recurring_type.as_str(),
                new.payment_date.to_string(),
                new.due_date.map(|d| d.to_string()),
                new.source_hash,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn get_expense(&self, id: i64) -> Result<Expense> {
        let conn = self.conn()?;
        let query = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        conn.query_row(&query, params![id], map_expense_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::NotFound(format!("Expense {}", id))
                }
                other => Error::Database(other),
            })
    }

    /// List expenses, newest first.
    pub fn list_expenses(&self, limit: i64, offset: i64) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {} FROM expenses ORDER BY payment_date DESC, id DESC LIMIT ? OFFSET ?",
            EXPENSE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let expenses = stmt
            .query_map(params![limit, offset], map_expense_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    /// A merchant's expenses in payment-date order (oldest first).
    pub fn expenses_for_merchant(&self, merchant: &str) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {} FROM expenses WHERE merchant = ? COLLATE NOCASE \
             ORDER BY payment_date ASC, id ASC",
            EXPENSE_COLUMNS
        );
        let mut stmt = conn.prepare(&query)?;
        let expenses = stmt
            .query_map(params![merchant], map_expense_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    /// Update the recurrence fields set by the detector.
    pub fn update_recurring(
        &self,
        id: i64,
        recurring_type: RecurringType,
        next_recurring_date: Option<NaiveDate>,
    ) -> Result<()> {
        // Invariant: a non-recurring expense carries no next date.
        let next = match recurring_type {
            RecurringType::None => None,
            _ => next_recurring_date,
        };
        let conn = self.conn()?;
        conn.execute(
            "UPDATE expenses SET recurring_type = ?, next_recurring_date = ? WHERE id = ?",
            params![recurring_type.as_str(), next.map(|d| d.to_string()), id],
        )?;
        Ok(())
    }

    /// User edit: reassign the category.
    pub fn update_category(&self, id: i64, category: crate::models::Category) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE expenses SET category = ? WHERE id = ?",
            params![category.as_str(), id],
        )?;
        Ok(())
    }

    /// User edit: change the payment status.
    pub fn update_payment_status(
        &self,
        id: i64,
        status: crate::models::PaymentStatus,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE expenses SET payment_status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Mark or unmark a merchant's recurring expenses for cancellation.
    ///
    /// Only recurring rows are touched, preserving the invariant that
    /// `to_be_cancelled` implies a recurrence.
    pub fn set_to_be_cancelled(&self, merchant: &str, to_be_cancelled: bool) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE expenses SET to_be_cancelled = ? \
             WHERE merchant = ? COLLATE NOCASE AND recurring_type != 'none'",
            params![to_be_cancelled, merchant],
        )?;
        Ok(changed)
    }

    /// Explicit user deletion - the only way an expense leaves the store.
    pub fn delete_expense(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM expenses WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Expense {}", id)));
        }
        Ok(())
    }

    pub fn count_expenses(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?)
    }

    /// Total spend over an inclusive date range.
    pub fn total_spend(&self, start: NaiveDate, end: NaiveDate) -> Result<f64> {
        let conn = self.conn()?;
        let total: Option<f64> = conn.query_row(
            "SELECT SUM(amount) FROM expenses WHERE payment_date BETWEEN ? AND ?",
            params![start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    /// Spend grouped by category over an inclusive date range.
    pub fn sum_by_category(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(crate::models::Category, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount) FROM expenses \
             WHERE payment_date BETWEEN ? AND ? \
             GROUP BY category ORDER BY SUM(amount) DESC",
        )?;
        let rows = stmt
            .query_map(params![start.to_string(), end.to_string()], |row| {
                let category: String = row.get(0)?;
                let amount: f64 = row.get(1)?;
                Ok((category.parse().unwrap_or_default(), amount))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Spend grouped by merchant over an inclusive date range.
    pub fn sum_by_merchant(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(String, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT merchant, SUM(amount) FROM expenses \
             WHERE payment_date BETWEEN ? AND ? \
             GROUP BY merchant COLLATE NOCASE ORDER BY SUM(amount) DESC",
        )?;
        let rows = stmt
            .query_map(params![start.to_string(), end.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Cumulative running spend ordered by payment date.
    pub fn running_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payment_date, \
                    SUM(SUM(amount)) OVER (ORDER BY payment_date) AS running \
             FROM expenses \
             WHERE payment_date BETWEEN ? AND ? \
             GROUP BY payment_date ORDER BY payment_date",
        )?;
        let rows = stmt
            .query_map(params![start.to_string(), end.to_string()], |row| {
                let date: String = row.get(0)?;
                let running: f64 = row.get(1)?;
                Ok((date, running))
            })?
            .collect::<std::result::Result<Vec<(String, f64)>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(date, running)| {
                NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .ok()
                    .map(|d| (d, running))
            })
            .collect())
    }
}
