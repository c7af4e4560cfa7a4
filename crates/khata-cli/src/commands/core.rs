//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Show database and AI backend status

use std::path::Path;

use anyhow::{Context, Result};
use khata_core::ai::AiBackend;
use khata_core::db::{Database, DB_KEY_ENV};
use khata_core::AiClient;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_string_lossy();
    if no_encrypt {
        Database::new_unencrypted(&path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(&path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Run a sync: khata sync --file messages.jsonl --sender QNB");
    println!("  2. Set a budget: khata budget set --amount 3000");

    Ok(())
}

pub async fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 Khata Status");
    println!("   ────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                println!("   Expenses: {}", db.count_expenses().unwrap_or(0));
                println!(
                    "   Budgets: {}",
                    db.list_budgets().map(|b| b.len()).unwrap_or(0)
                );
            }
            Err(e) => println!("   ❌ Error opening database: {}", e),
        }
    } else {
        println!("   (database not initialized - run `khata init`)");
    }

    println!();
    match AiClient::from_env() {
        Some(ai) => {
            let reachable = ai.health_check().await;
            println!("   AI backend: {} ({})", ai.model(), ai.host());
            println!(
                "   AI health: {}",
                if reachable { "✅ reachable" } else { "❌ unreachable" }
            );
        }
        None => {
            println!("   AI backend: not configured");
            println!("   💡 Tip: Set GEMINI_API_KEY, or KHATA_AI_BACKEND=mock for a dry run");
        }
    }

    Ok(())
}
