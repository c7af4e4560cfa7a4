//! Khata CLI - bank-message expense pipeline
//!
//! Usage:
//!   khata init                          Initialize database
//!   khata sync --file messages.jsonl --sender QNB
//!                                       Run one sync pass
//!   khata expenses                      List persisted expenses
//!   khata budget set --amount 3000      Set this month's budget
//!   khata chat "how much on food?"      Ask the assistant

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Sync {
            file,
            senders,
            keywords,
            ignore_words,
            since,
        } => {
            commands::cmd_sync(
                &cli.db,
                &file,
                senders,
                keywords,
                ignore_words,
                since.as_deref(),
                cli.no_encrypt,
            )
            .await
        }
        Commands::Expenses { limit } => commands::cmd_expenses(&cli.db, limit, cli.no_encrypt),
        Commands::Budget { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                BudgetAction::Set { period, amount } => {
                    commands::cmd_budget_set(&db, period.as_deref(), amount)
                }
                BudgetAction::Status { period } => {
                    commands::cmd_budget_status(&db, period.as_deref())
                }
            }
        }
        Commands::Chat { message } => commands::cmd_chat(&cli.db, &message, cli.no_encrypt).await,
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt).await,
    }
}
