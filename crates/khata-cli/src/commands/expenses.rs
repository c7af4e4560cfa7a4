//! Expense listing command

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub fn cmd_expenses(db_path: &Path, limit: i64, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let expenses = db.list_expenses(limit, 0)?;

    if expenses.is_empty() {
        println!("No expenses yet. Run `khata sync` first.");
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:>10} {:<5} {:<24} {:<14} {:<10}",
        "ID", "Date", "Amount", "Cur", "Merchant", "Category", "Recurring"
    );
    for e in &expenses {
        let recurring = match e.next_recurring_date {
            Some(next) => format!("{} → {}", e.recurring_type, next),
            None => e.recurring_type.to_string(),
        };
        println!(
            "{:<6} {:<12} {:>10.2} {:<5} {:<24} {:<14} {:<10}",
            e.id,
            e.payment_date.to_string(),
            e.amount,
            e.currency.to_string(),
            truncate(&e.merchant, 24),
            e.category.to_string(),
            recurring,
        );
    }
    println!();
    println!("{} expense(s)", expenses.len());

    Ok(())
}

/// Truncate a string to a maximum length, adding "..." if truncated
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
