//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Khata - Turn bank SMS messages into a spending ledger
#[derive(Parser)]
#[command(name = "khata")]
#[command(about = "Bank-message expense pipeline with AI extraction", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "khata.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set KHATA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Run one sync pass over a message file
    Sync {
        /// JSONL file of messages (one {id, address, body, timestamp} per line)
        #[arg(short, long)]
        file: PathBuf,

        /// Sender allow-list entry (repeatable, substring match)
        #[arg(short, long = "sender", required = true)]
        senders: Vec<String>,

        /// Keyword the body must contain (repeatable; all bodies match if omitted)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Word that disqualifies a body (repeatable)
        #[arg(long = "ignore")]
        ignore_words: Vec<String>,

        /// Only consider messages on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },

    /// List persisted expenses
    Expenses {
        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Manage monthly budgets
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },

    /// Ask the finance assistant a question
    Chat {
        /// The question to ask
        message: String,
    },

    /// Show database and AI backend status
    Status,
}

#[derive(Subcommand)]
pub enum BudgetAction {
    /// Set the budget for a period
    Set {
        /// Period key, e.g. 2026-08 (defaults to the current month)
        #[arg(short, long)]
        period: Option<String>,

        /// Budget amount
        #[arg(short, long)]
        amount: f64,
    },

    /// Show budget vs. spend for a period
    Status {
        /// Period key, e.g. 2026-08 (defaults to the current month)
        #[arg(short, long)]
        period: Option<String>,
    },
}
