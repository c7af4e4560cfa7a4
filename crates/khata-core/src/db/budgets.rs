//! Budget operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Budget;

impl Database {
    /// Create or update the budget for a period ("YYYY-MM").
    pub fn upsert_budget(&self, period: &str, amount: f64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO budgets (period, amount) VALUES (?, ?)
            ON CONFLICT(period) DO UPDATE SET amount = excluded.amount
            "#,
            params![period, amount],
        )?;
        let id = conn.query_row(
            "SELECT id FROM budgets WHERE period = ?",
            params![period],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_budget(&self, period: &str) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                "SELECT id, period, amount, created_at FROM budgets WHERE period = ?",
                params![period],
                |row| {
                    let created_at: String = row.get(3)?;
                    Ok(Budget {
                        id: row.get(0)?,
                        period: row.get(1)?,
                        amount: row.get(2)?,
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(budget)
    }

    pub fn list_budgets(&self) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, period, amount, created_at FROM budgets ORDER BY period DESC",
        )?;
        let budgets = stmt
            .query_map([], |row| {
                let created_at: String = row.get(3)?;
                Ok(Budget {
                    id: row.get(0)?,
                    period: row.get(1)?,
                    amount: row.get(2)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(budgets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_budget_replaces_amount() {
        let db = Database::in_memory().unwrap();
        let first = db.upsert_budget("2026-08", 3000.0).unwrap();
        let second = db.upsert_budget("2026-08", 3500.0).unwrap();
        assert_eq!(first, second);

        let budget = db.get_budget("2026-08").unwrap().unwrap();
        assert_eq!(budget.amount, 3500.0);
    }

    #[test]
    fn test_missing_budget_is_none() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_budget("2026-01").unwrap().is_none());
    }

    #[test]
    fn test_list_budgets_newest_period_first() {
        let db = Database::in_memory().unwrap();
        db.upsert_budget("2026-07", 3000.0).unwrap();
        db.upsert_budget("2026-08", 3200.0).unwrap();
        let budgets = db.list_budgets().unwrap();
        assert_eq!(budgets[0].period, "2026-08");
        assert_eq!(budgets[1].period, "2026-07");
    }
}
