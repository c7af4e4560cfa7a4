//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, status) and shared utilities (open_db)
//! - `sync` - One-shot sync pass over a message file
//! - `expenses` - Expense listing
//! - `budget` - Budget set/status commands
//! - `chat` - Finance assistant

pub mod budget;
pub mod chat;
pub mod core;
pub mod expenses;
pub mod sync;

// Re-export command functions for main.rs
pub use budget::*;
pub use chat::*;
pub use core::*;
pub use expenses::*;
pub use sync::*;
