//! Domain models for khata

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An inbound bank message that passed the sender/keyword/date filters
/// and is eligible for AI extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMessage {
    /// Message identity within the store (stable across syncs)
    pub id: String,
    /// Sender address (e.g., "QNB-Alert")
    pub address: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl CandidateMessage {
    /// Dedup hash over the message identity.
    ///
    /// Re-ingesting the same message across runs produces the same hash,
    /// so the expense insert becomes a no-op.
    pub fn source_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.address.as_bytes());
        hasher.update(b"|");
        hasher.update(self.body.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Qar,
    Usd,
    Eur,
    Gbp,
    Bdt,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qar => "QAR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Bdt => "BDT",
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QAR" => Ok(Self::Qar),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "BDT" => Ok(Self::Bdt),
            _ => Err(format!("Unknown currency: {}", s)),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expense categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Grocery,
    Shopping,
    Transport,
    Bills,
    Entertainment,
    Health,
    Education,
    Travel,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Grocery => "grocery",
            Self::Shopping => "shopping",
            Self::Transport => "transport",
            Self::Bills => "bills",
            Self::Entertainment => "entertainment",
            Self::Health => "health",
            Self::Education => "education",
            Self::Travel => "travel",
            Self::Other => "other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::Food,
            Self::Grocery,
            Self::Shopping,
            Self::Transport,
            Self::Bills,
            Self::Entertainment,
            Self::Health,
            Self::Education,
            Self::Travel,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "food" | "dining" | "restaurant" => Ok(Self::Food),
            "grocery" | "groceries" => Ok(Self::Grocery),
            "shopping" => Ok(Self::Shopping),
            "transport" | "transportation" | "fuel" => Ok(Self::Transport),
            "bills" | "utilities" => Ok(Self::Bills),
            "entertainment" | "streaming" => Ok(Self::Entertainment),
            "health" | "medical" | "pharmacy" => Ok(Self::Health),
            "education" => Ok(Self::Education),
            "travel" => Ok(Self::Travel),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status of an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurrence cadence of an expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecurringType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurringType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Apply the fixed calendar cadence to a date.
    ///
    /// Returns `None` for `RecurringType::None` - a non-recurring expense
    /// has no next date by invariant.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::None => None,
            Self::Daily => date.checked_add_days(Days::new(1)),
            Self::Weekly => date.checked_add_days(Days::new(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
            Self::Yearly => date.checked_add_months(Months::new(12)),
        }
    }
}

impl std::str::FromStr for RecurringType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Unknown recurring type: {}", s)),
        }
    }
}

impl std::fmt::Display for RecurringType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted expense record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub amount: f64,
    pub currency: Currency,
    pub merchant: String,
    pub category: Category,
    pub payment_status: PaymentStatus,
    pub recurring_type: RecurringType,
    /// Date the payment happened (from the message, never in the future)
    pub payment_date: NaiveDate,
    /// Due date for pending payments, if the message carried one
    pub due_date: Option<NaiveDate>,
    /// Next expected charge for recurring expenses
    pub next_recurring_date: Option<NaiveDate>,
    /// User marked this subscription for cancellation
    pub to_be_cancelled: bool,
    /// Hash of the originating message identity (for deduplication)
    pub source_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A new expense to be persisted (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub amount: f64,
    pub currency: Currency,
    pub merchant: String,
    pub category: Category,
    pub payment_status: PaymentStatus,
    pub recurring_type: RecurringType,
    pub payment_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub source_hash: String,
}

impl NewExpense {
    /// Enforce the creation invariants before the record reaches the store.
    ///
    /// - amount must be positive and finite
    /// - payment_date must not be in the future
    /// - merchant must be non-empty
    pub fn validate(&self, today: NaiveDate) -> crate::error::Result<()> {
        use crate::error::Error;

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Expense amount must be positive and finite, got {}",
                self.amount
            )));
        }
        if self.payment_date > today {
            return Err(Error::InvalidData(format!(
                "Payment date {} is in the future",
                self.payment_date
            )));
        }
        if self.merchant.trim().is_empty() {
            return Err(Error::InvalidData("Expense merchant is empty".into()));
        }
        Ok(())
    }
}

/// A monthly budget, keyed by period ("YYYY-MM")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    /// Period key, e.g., "2026-08"
    pub period: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "model" => Ok(Self::Assistant),
            _ => Err(format!("Unknown chat role: {}", s)),
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Sync run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live progress of a sync run.
///
/// One instance per run, overwritten monotonically; `current` counts
/// persisted successes only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub total: usize,
    pub current: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of a sync run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub state: SyncState,
    /// Candidates returned by the filter (after the per-run cap)
    pub fetched: usize,
    /// Messages that produced a valid extraction
    pub extracted: usize,
    /// Expenses actually inserted (dedup hits excluded)
    pub persisted: usize,
    /// Messages skipped due to per-item errors or dedup
    pub skipped: usize,
    /// The request coalesced into an already-running sync
    pub coalesced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cadence_advance() {
        let d = date(2026, 1, 31);
        assert_eq!(RecurringType::None.advance(d), None);
        assert_eq!(RecurringType::Daily.advance(d), Some(date(2026, 2, 1)));
        assert_eq!(RecurringType::Weekly.advance(d), Some(date(2026, 2, 7)));
        // Month-end clamping is chrono's behavior
        assert_eq!(RecurringType::Monthly.advance(d), Some(date(2026, 2, 28)));
        assert_eq!(RecurringType::Yearly.advance(d), Some(date(2027, 1, 31)));
    }

    #[test]
    fn test_currency_round_trip() {
        for s in ["QAR", "USD", "EUR", "GBP", "BDT"] {
            let c: Currency = s.parse().unwrap();
            assert_eq!(c.as_str(), s);
        }
        assert!("JPY".parse::<Currency>().is_err());
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!("Dining".parse::<Category>().unwrap(), Category::Food);
        assert_eq!("groceries".parse::<Category>().unwrap(), Category::Grocery);
        assert_eq!("streaming".parse::<Category>().unwrap(), Category::Entertainment);
    }

    #[test]
    fn test_new_expense_validation() {
        let today = date(2026, 8, 6);
        let mut e = NewExpense {
            amount: 49.0,
            currency: Currency::Qar,
            merchant: "Ooredoo".into(),
            category: Category::Bills,
            payment_status: PaymentStatus::Paid,
            recurring_type: RecurringType::Monthly,
            payment_date: date(2026, 8, 1),
            due_date: None,
            source_hash: "abc".into(),
        };
        assert!(e.validate(today).is_ok());

        e.amount = 0.0;
        assert!(e.validate(today).is_err());
        e.amount = f64::NAN;
        assert!(e.validate(today).is_err());
        e.amount = 49.0;

        e.payment_date = date(2026, 8, 7);
        assert!(e.validate(today).is_err());
        e.payment_date = date(2026, 8, 1);

        e.merchant = "  ".into();
        assert!(e.validate(today).is_err());
    }

    #[test]
    fn test_source_hash_stable() {
        let msg = CandidateMessage {
            id: "42".into(),
            address: "QNB-Alert".into(),
            body: "You spent QAR 49.00".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(msg.source_hash(), msg.source_hash());
        let other = CandidateMessage {
            id: "43".into(),
            ..msg.clone()
        };
        assert_ne!(msg.source_hash(), other.source_hash());
    }
}
