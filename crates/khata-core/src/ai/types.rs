//! AI extraction result types
//!
//! Backend-agnostic draft produced by the extraction call, before the
//! invariants are enforced and the record is persisted.

use chrono::NaiveDate;

use crate::models::{
    CandidateMessage, Category, Currency, NewExpense, PaymentStatus, RecurringType,
};

/// A structured expense draft decoded from the AI response.
///
/// Optional fields were either absent from the response or failed the
/// best-effort coercion; they fall back to declared defaults (or to message
/// metadata) when the draft becomes a `NewExpense`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedExpense {
    pub amount: f64,
    pub currency: Currency,
    pub merchant: String,
    pub category: Category,
    pub payment_status: PaymentStatus,
    pub recurring_type: RecurringType,
    /// Payment date as reported by the provider; None falls back to the
    /// message timestamp.
    pub payment_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl ExtractedExpense {
    /// Bind the draft to its originating message.
    pub fn into_new_expense(self, message: &CandidateMessage) -> NewExpense {
        let message_date = message.timestamp.date_naive();
        NewExpense {
            amount: self.amount,
            currency: self.currency,
            merchant: self.merchant,
            category: self.category,
            payment_status: self.payment_status,
            recurring_type: self.recurring_type,
            payment_date: self.payment_date.unwrap_or(message_date),
            due_date: self.due_date,
            source_hash: message.source_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payment_date_falls_back_to_message_date() {
        let message = CandidateMessage {
            id: "1".into(),
            address: "QNB-Alert".into(),
            body: "spent".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 8, 2, 10, 30, 0).unwrap(),
        };
        let draft = ExtractedExpense {
            amount: 20.0,
            currency: Currency::Qar,
            merchant: "Karak House".into(),
            category: Category::Food,
            payment_status: PaymentStatus::Paid,
            recurring_type: RecurringType::None,
            payment_date: None,
            due_date: None,
        };
        let new = draft.into_new_expense(&message);
        assert_eq!(new.payment_date, NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        assert_eq!(new.source_hash, message.source_hash());
    }
}
