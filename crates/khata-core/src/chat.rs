//! Chat assistant
//!
//! Conversational Q&A seeded with recent expense and budget context. Shares
//! the AI channel (and therefore the rate limiter and error taxonomy) with
//! the extraction pipeline.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::ai::{AiBackend, AiClient};
use crate::budget::{period_bounds, period_key};
use crate::config::ChatConfig;
use crate::db::Database;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::models::ChatRole;

pub struct ChatAssistant {
    db: Database,
    ai: AiClient,
    limiter: Arc<RateLimiter>,
    config: ChatConfig,
}

impl ChatAssistant {
    pub fn new(db: Database, ai: AiClient, limiter: Arc<RateLimiter>, config: ChatConfig) -> Self {
        Self {
            db,
            ai,
            limiter,
            config,
        }
    }

    /// Answer one question, persisting both turns.
    ///
    /// Unlike extraction there is no skip semantics here: any AI failure
    /// propagates to the caller.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let history = self.db.recent_chat_messages(20)?;
        let context = self.build_context(Utc::now().date_naive())?;
        let seeded = format!("{}\n\nQuestion: {}", context, question);

        self.limiter.admit().await;
        let reply = self.ai.chat(&history, &seeded).await?;

        self.db.insert_chat_message(ChatRole::User, question)?;
        self.db.insert_chat_message(ChatRole::Assistant, &reply)?;
        Ok(reply)
    }

    /// Render recent spending and budget state as prompt context.
    fn build_context(&self, today: NaiveDate) -> Result<String> {
        let mut lines = vec![
            "You are a personal finance assistant. Context about the user's spending:"
                .to_string(),
        ];

        let expenses = self.db.list_expenses(self.config.context_expenses as i64, 0)?;
        if expenses.is_empty() {
            lines.push("No expenses recorded yet.".to_string());
        } else {
            lines.push("Recent expenses:".to_string());
            for e in &expenses {
                lines.push(format!(
                    "- {} {} {} at {} ({})",
                    e.payment_date, e.currency, e.amount, e.merchant, e.category
                ));
            }
        }

        let period = period_key(today);
        if let Some(budget) = self.db.get_budget(&period)? {
            let (start, end) = period_bounds(&period)?;
            let spent = self.db.total_spend(start, end)?;
            lines.push(format!(
                "Budget for {}: {:.2}, spent so far: {:.2}",
                period, budget.amount, spent
            ));
        }

        debug!(lines = lines.len(), "Chat context assembled");
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Currency, NewExpense, PaymentStatus, RecurringType};
    use std::time::Duration;

    fn assistant(db: &Database) -> ChatAssistant {
        ChatAssistant::new(
            db.clone(),
            AiClient::mock(),
            Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            ChatConfig {
                context_expenses: 15,
            },
        )
    }

    fn spend(db: &Database, merchant: &str, amount: f64, hash: &str) {
        db.insert_expense(&NewExpense {
            amount,
            currency: Currency::Qar,
            merchant: merchant.into(),
            category: Category::Food,
            payment_status: PaymentStatus::Paid,
            recurring_type: RecurringType::None,
            payment_date: Utc::now().date_naive(),
            due_date: None,
            source_hash: hash.into(),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_ask_persists_both_turns() {
        let db = Database::in_memory().unwrap();
        let chat = assistant(&db);

        let reply = chat.ask("How much did I spend on food?").await.unwrap();
        assert!(!reply.is_empty());

        let history = db.recent_chat_messages(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "How much did I spend on food?");
        assert_eq!(history[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_context_includes_expenses_and_budget() {
        let db = Database::in_memory().unwrap();
        let chat = assistant(&db);

        let today = Utc::now().date_naive();
        spend(&db, "Karak House", 12.0, "h1");
        db.upsert_budget(&period_key(today), 3000.0).unwrap();

        let context = chat.build_context(today).unwrap();
        assert!(context.contains("Karak House"));
        assert!(context.contains("Budget for"));
        assert!(context.contains("3000"));
    }

    #[test]
    fn test_context_without_data_mentions_empty_state() {
        let db = Database::in_memory().unwrap();
        let chat = assistant(&db);
        let context = chat.build_context(Utc::now().date_naive()).unwrap();
        assert!(context.contains("No expenses recorded yet."));
    }
}
