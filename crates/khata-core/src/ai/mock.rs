//! Mock backend for testing
//!
//! Deterministic extraction from message bodies, plus failure injection so
//! the orchestrator's retry and skip paths can be exercised without a
//! provider.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AiError, Error, Result};
use crate::models::{CandidateMessage, Category, ChatMessage, Currency, RecurringType};

use super::types::ExtractedExpense;
use super::AiBackend;

/// Mock AI backend
///
/// Scans message bodies for an amount and a merchant, classifies well-known
/// merchants, and guesses recurrence from subscription wording. Bodies
/// containing configured markers simulate provider failures.
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Bodies containing this marker yield a Serialization error
    parse_failure_marker: Option<String>,
    /// Every extraction fails with InvalidCredentials
    invalid_credentials: bool,
    /// Remaining calls that fail with QuotaExceeded before succeeding
    quota_failures: Arc<AtomicU32>,
    /// Total extraction calls observed
    extraction_calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            parse_failure_marker: None,
            invalid_credentials: false,
            quota_failures: Arc::new(AtomicU32::new(0)),
            extraction_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Bodies containing `marker` will fail extraction with a
    /// Serialization error (simulating malformed provider JSON).
    pub fn with_parse_failure_marker(mut self, marker: &str) -> Self {
        self.parse_failure_marker = Some(marker.to_string());
        self
    }

    /// The next `n` extraction calls fail with QuotaExceeded.
    pub fn with_quota_failures(self, n: u32) -> Self {
        self.quota_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every extraction fails with InvalidCredentials (fatal to the run).
    pub fn with_invalid_credentials(mut self) -> Self {
        self.invalid_credentials = true;
        self
    }

    /// Number of extraction calls made so far (including failed ones).
    pub fn extraction_calls(&self) -> usize {
        self.extraction_calls.load(Ordering::SeqCst)
    }

    /// Best-effort amount scan: first number following a currency token.
    fn scan_amount(body: &str) -> Option<(f64, Currency)> {
        let upper = body.to_uppercase();
        for token in ["QAR", "USD", "EUR", "GBP", "BDT"] {
            if let Some(pos) = upper.find(token) {
                let rest = &upper[pos + token.len()..];
                let number: String = rest
                    .chars()
                    .skip_while(|c| c.is_whitespace())
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                    .collect();
                if let Ok(amount) = number.replace(',', "").parse::<f64>() {
                    let currency = token.parse().unwrap_or_default();
                    return Some((amount, currency));
                }
            }
        }
        None
    }

    /// Merchant is whatever follows " at " up to the next punctuation.
    fn scan_merchant(body: &str) -> String {
        let lower = body.to_lowercase();
        if let Some(pos) = lower.find(" at ") {
            let rest = &body[pos + 4..];
            let merchant: String = rest
                .chars()
                .take_while(|c| !matches!(c, '.' | ',' | '\n' | ';'))
                .collect();
            let merchant = merchant.trim();
            if !merchant.is_empty() {
                return merchant.to_string();
            }
        }
        "Unknown Merchant".to_string()
    }

    fn classify(merchant: &str) -> Category {
        let upper = merchant.to_uppercase();
        match () {
            _ if upper.contains("NETFLIX") || upper.contains("OSN") => Category::Entertainment,
            _ if upper.contains("LULU") || upper.contains("CARREFOUR") => Category::Grocery,
            _ if upper.contains("OOREDOO") || upper.contains("VODAFONE") => Category::Bills,
            _ if upper.contains("UBER") || upper.contains("KARWA") || upper.contains("WOQOD") => {
                Category::Transport
            }
            _ if upper.contains("TALABAT") || upper.contains("RESTAURANT") => Category::Food,
            _ if upper.contains("PHARMACY") || upper.contains("CLINIC") => Category::Health,
            _ => Category::Other,
        }
    }
}

#[async_trait]
impl AiBackend for MockBackend {
    async fn extract_expense(&self, message: &CandidateMessage) -> Result<ExtractedExpense> {
        self.extraction_calls.fetch_add(1, Ordering::SeqCst);

        if self.invalid_credentials {
            return Err(Error::Ai(AiError::InvalidCredentials));
        }

        if self
            .quota_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Ai(AiError::QuotaExceeded));
        }

        if let Some(marker) = &self.parse_failure_marker {
            if message.body.contains(marker) {
                return Err(Error::Ai(AiError::Serialization(
                    "No JSON found in AI response".into(),
                )));
            }
        }

        let (amount, currency) = Self::scan_amount(&message.body).unwrap_or((10.0, Currency::Qar));
        let merchant = Self::scan_merchant(&message.body);
        let body_lower = message.body.to_lowercase();
        let recurring_type =
            if body_lower.contains("subscription") || body_lower.contains("renewal") {
                RecurringType::Monthly
            } else {
                RecurringType::None
            };

        Ok(ExtractedExpense {
            amount,
            currency,
            category: Self::classify(&merchant),
            merchant,
            payment_status: Default::default(),
            recurring_type,
            payment_date: Some(message.timestamp.date_naive()),
            due_date: None,
        })
    }

    async fn chat(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        Ok(format!(
            "mock reply to \"{}\" ({} prior turns)",
            message,
            history.len()
        ))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(body: &str) -> CandidateMessage {
        CandidateMessage {
            id: "1".into(),
            address: "QNB-Alert".into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_extracts_amount_merchant_and_category() {
        let mock = MockBackend::new();
        let result = mock
            .extract_expense(&msg("Card used for QAR 75.50 at LULU HYPERMARKET. Ref 9921"))
            .await
            .unwrap();
        assert_eq!(result.amount, 75.50);
        assert_eq!(result.currency, Currency::Qar);
        assert_eq!(result.merchant, "LULU HYPERMARKET");
        assert_eq!(result.category, Category::Grocery);
        assert_eq!(result.recurring_type, RecurringType::None);
    }

    #[tokio::test]
    async fn test_subscription_wording_hints_monthly() {
        let mock = MockBackend::new();
        let result = mock
            .extract_expense(&msg("Subscription renewal of QAR 39.00 at OSN"))
            .await
            .unwrap();
        assert_eq!(result.recurring_type, RecurringType::Monthly);
    }

    #[tokio::test]
    async fn test_parse_failure_marker() {
        let mock = MockBackend::new().with_parse_failure_marker("garbled");
        let err = mock.extract_expense(&msg("garbled text")).await.unwrap_err();
        assert!(matches!(err, Error::Ai(AiError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_quota_failures_then_success() {
        let mock = MockBackend::new().with_quota_failures(2);
        let m = msg("QAR 5 at Karak");
        assert!(mock.extract_expense(&m).await.is_err());
        assert!(mock.extract_expense(&m).await.is_err());
        assert!(mock.extract_expense(&m).await.is_ok());
        assert_eq!(mock.extraction_calls(), 3);
    }
}
