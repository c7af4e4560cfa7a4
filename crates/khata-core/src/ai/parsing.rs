//! JSON parsing helpers for AI responses
//!
//! Extraction replies should be bare JSON, but models often wrap the payload
//! in prose or code fences. These helpers locate the JSON object, then decode
//! it with unknown-field tolerance and best-effort type coercion.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AiError, Error, Result};

use super::types::ExtractedExpense;

/// Raw extraction payload as the provider sends it.
///
/// Every field except amount is optional; enum-valued fields arrive as free
/// strings and are coerced with fallback to defaults.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    amount: Value,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    recurring_type: Option<String>,
    #[serde(default)]
    payment_date: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

/// Locate the first balanced JSON object in a response.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in response[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse an extraction reply into a typed draft.
///
/// Decode failures are per-message `AiError::Serialization` errors: the
/// orchestrator logs and skips, never aborts the batch.
pub fn parse_extraction(response: &str) -> Result<ExtractedExpense> {
    let json_str = extract_json_object(response.trim()).ok_or_else(|| {
        Error::Ai(AiError::Serialization(format!(
            "No JSON found in AI response | Raw: {}",
            truncate(response, 200)
        )))
    })?;

    let raw: RawExtraction = serde_json::from_str(json_str).map_err(|e| {
        Error::Ai(AiError::Serialization(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            truncate(json_str, 200)
        )))
    })?;

    let amount = coerce_amount(&raw.amount).ok_or_else(|| {
        Error::Ai(AiError::Serialization(format!(
            "Amount is not numeric: {}",
            raw.amount
        )))
    })?;

    Ok(ExtractedExpense {
        amount,
        currency: parse_or_default(raw.currency.as_deref()),
        merchant: raw.merchant.unwrap_or_default(),
        category: parse_or_default(raw.category.as_deref()),
        payment_status: parse_or_default(raw.payment_status.as_deref()),
        recurring_type: parse_or_default(raw.recurring_type.as_deref()),
        payment_date: raw.payment_date.as_deref().and_then(parse_iso_date),
        due_date: raw.due_date.as_deref().and_then(parse_iso_date),
    })
}

/// Coerce a JSON value into an amount: number, or numeric string.
fn coerce_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Parse an enum field, falling back to its declared default on unknown or
/// missing values.
fn parse_or_default<T: std::str::FromStr + Default>(value: Option<&str>) -> T {
    value.and_then(|s| s.parse().ok()).unwrap_or_default()
}

/// ISO-8601 date, tolerating a trailing time component.
fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Currency, PaymentStatus, RecurringType};

    #[test]
    fn test_parse_full_extraction() {
        let response = r#"{
            "amount": 49.0,
            "currency": "QAR",
            "merchant": "Ooredoo",
            "category": "bills",
            "payment_status": "paid",
            "recurring_type": "monthly",
            "payment_date": "2026-08-01"
        }"#;
        let result = parse_extraction(response).unwrap();
        assert_eq!(result.amount, 49.0);
        assert_eq!(result.currency, Currency::Qar);
        assert_eq!(result.merchant, "Ooredoo");
        assert_eq!(result.category, Category::Bills);
        assert_eq!(result.payment_status, PaymentStatus::Paid);
        assert_eq!(result.recurring_type, RecurringType::Monthly);
        assert_eq!(
            result.payment_date,
            Some(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap())
        );
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let response = "Here is the extraction:\n{\"amount\": 12.5, \"merchant\": \"Karak\"}\nDone!";
        let result = parse_extraction(response).unwrap();
        assert_eq!(result.amount, 12.5);
        assert_eq!(result.merchant, "Karak");
    }

    #[test]
    fn test_missing_optionals_fall_back_to_defaults() {
        let result = parse_extraction(r#"{"amount": 10}"#).unwrap();
        assert_eq!(result.currency, Currency::Qar);
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.payment_status, PaymentStatus::Pending);
        assert_eq!(result.recurring_type, RecurringType::None);
        assert_eq!(result.payment_date, None);
    }

    #[test]
    fn test_unknown_enum_values_fall_back() {
        let response = r#"{"amount": 10, "currency": "JPY", "category": "witchcraft"}"#;
        let result = parse_extraction(response).unwrap();
        assert_eq!(result.currency, Currency::Qar);
        assert_eq!(result.category, Category::Other);
    }

    #[test]
    fn test_amount_as_string_is_coerced() {
        let result = parse_extraction(r#"{"amount": "1,249.50"}"#).unwrap();
        assert_eq!(result.amount, 1249.50);
    }

    #[test]
    fn test_datetime_payment_date_tolerated() {
        let result =
            parse_extraction(r#"{"amount": 5, "payment_date": "2026-08-01T09:30:00Z"}"#).unwrap();
        assert_eq!(
            result.payment_date,
            Some(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap())
        );
    }

    #[test]
    fn test_no_json_is_serialization_error() {
        let err = parse_extraction("I could not parse that message.").unwrap_err();
        assert!(matches!(
            err,
            Error::Ai(AiError::Serialization(_))
        ));
    }

    #[test]
    fn test_non_numeric_amount_is_serialization_error() {
        let err = parse_extraction(r#"{"amount": "forty nine"}"#).unwrap_err();
        assert!(matches!(err, Error::Ai(AiError::Serialization(_))));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scanner() {
        let response = r#"{"amount": 7, "merchant": "Curly {Bros}"}"#;
        let result = parse_extraction(response).unwrap();
        assert_eq!(result.merchant, "Curly {Bros}");
    }
}
