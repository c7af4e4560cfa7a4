//! Budget commands

use anyhow::Result;
use chrono::Utc;

use khata_core::budget::{period_bounds, period_key};
use khata_core::db::Database;

fn resolve_period(period: Option<&str>) -> String {
    period
        .map(String::from)
        .unwrap_or_else(|| period_key(Utc::now().date_naive()))
}

pub fn cmd_budget_set(db: &Database, period: Option<&str>, amount: f64) -> Result<()> {
    let period = resolve_period(period);
    db.upsert_budget(&period, amount)?;
    println!("✅ Budget for {} set to {:.2}", period, amount);
    Ok(())
}

pub fn cmd_budget_status(db: &Database, period: Option<&str>) -> Result<()> {
    let period = resolve_period(period);

    let Some(budget) = db.get_budget(&period)? else {
        println!("No budget set for {}.", period);
        println!("💡 Set one with: khata budget set --period {} --amount 3000", period);
        return Ok(());
    };

    let (start, end) = period_bounds(&period)?;
    let spent = db.total_spend(start, end)?;
    let remaining = budget.amount - spent;

    println!();
    println!("💰 Budget for {}", period);
    println!("   Budget: {:>12.2}", budget.amount);
    println!("   Spent:  {:>12.2}", spent);
    if remaining >= 0.0 {
        println!("   Left:   {:>12.2}", remaining);
    } else {
        println!("   ⚠️  Over by {:.2}", -remaining);
    }

    let by_category = db.sum_by_category(start, end)?;
    if !by_category.is_empty() {
        println!();
        println!("   Top categories:");
        for (category, amount) in by_category.iter().take(5) {
            println!("   - {:<14} {:>10.2}", category.to_string(), amount);
        }
    }

    Ok(())
}
