//! Prompt templates and the extraction response schema
//!
//! The extraction prompt is a fixed template over (sender, body, formatted
//! date); the response schema constrains the provider to the expense fields
//! the parser understands.

use serde_json::{json, Value};

use crate::models::CandidateMessage;

/// Render the extraction prompt for one message.
pub fn extraction_prompt(message: &CandidateMessage) -> String {
    format!(
        "You are an expense extraction engine for bank transaction SMS messages.\n\
         Extract a single expense from the message below. Respond with JSON only.\n\
         \n\
         Sender: {sender}\n\
         Received: {date}\n\
         Message: {body}\n\
         \n\
         Rules:\n\
         - amount is the transaction amount as a positive number\n\
         - merchant is the payee name, cleaned of card/reference noise\n\
         - payment_date is the transaction date in ISO-8601 (YYYY-MM-DD)\n\
         - recurring_type is a guess from wording like subscription or renewal\n\
         - when unsure, omit the field rather than invent a value",
        sender = message.address,
        date = message.timestamp.format("%Y-%m-%d %H:%M"),
        body = message.body,
    )
}

/// Response schema for the extraction call.
///
/// Mirrors the provider's OpenAPI-subset schema format: amount is the only
/// required field; enums list the values the parser accepts directly
/// (anything else falls back to defaults during decoding).
pub fn extraction_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "amount": { "type": "number" },
            "currency": {
                "type": "string",
                "enum": ["QAR", "USD", "EUR", "GBP", "BDT"]
            },
            "merchant": { "type": "string" },
            "category": {
                "type": "string",
                "enum": [
                    "food", "grocery", "shopping", "transport", "bills",
                    "entertainment", "health", "education", "travel", "other"
                ]
            },
            "payment_status": {
                "type": "string",
                "enum": ["pending", "paid", "overdue", "cancelled"]
            },
            "recurring_type": {
                "type": "string",
                "enum": ["none", "daily", "weekly", "monthly", "yearly"]
            },
            "payment_date": { "type": "string" },
            "due_date": { "type": "string" }
        },
        "required": ["amount"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_prompt_includes_message_fields() {
        let message = CandidateMessage {
            id: "1".into(),
            address: "CBQ".into(),
            body: "Card ending 1234 used for QAR 75.50 at LULU HYPERMARKET".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 14, 18, 5, 0).unwrap(),
        };
        let prompt = extraction_prompt(&message);
        assert!(prompt.contains("CBQ"));
        assert!(prompt.contains("LULU HYPERMARKET"));
        assert!(prompt.contains("2026-07-14 18:05"));
    }

    #[test]
    fn test_schema_requires_amount_only() {
        let schema = extraction_response_schema();
        assert_eq!(schema["required"], json!(["amount"]));
        assert!(schema["properties"]["currency"]["enum"]
            .as_array()
            .unwrap()
            .contains(&json!("QAR")));
    }
}
