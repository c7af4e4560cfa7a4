//! Message filtering
//!
//! Selects bank messages eligible for AI extraction: sender allow-list,
//! optional keyword include/exclude lists, and a date range. Pure read -
//! no network or AI access happens here.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::CandidateMessage;

/// Filter criteria for querying the message store.
///
/// The sender list is OR-matched: an address qualifies when any allow-listed
/// sender appears in it as a case-insensitive substring. Single-sender
/// callers pass a one-element list.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    /// Sender allow-list (must be non-empty)
    pub senders: Vec<String>,
    /// Body must contain at least one of these, when non-empty
    pub keywords: Vec<String>,
    /// Body must contain none of these
    pub ignore_words: Vec<String>,
    /// Inclusive range start; unbounded when None
    pub start: Option<DateTime<Utc>>,
    /// Inclusive range end; defaults to now when None
    pub end: Option<DateTime<Utc>>,
}

impl MessageQuery {
    pub fn new(senders: Vec<String>) -> Self {
        Self {
            senders,
            keywords: Vec::new(),
            ignore_words: Vec::new(),
            start: None,
            end: None,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_ignore_words(mut self, ignore_words: Vec<String>) -> Self {
        self.ignore_words = ignore_words;
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Conjunctive predicate over one message, evaluated at `now`.
    ///
    /// `now` bounds the range end when no explicit end was given.
    pub fn matches_at(&self, message: &CandidateMessage, now: DateTime<Utc>) -> bool {
        let address = message.address.to_lowercase();
        if !self
            .senders
            .iter()
            .any(|s| address.contains(&s.to_lowercase()))
        {
            return false;
        }

        let body = message.body.to_lowercase();
        if !self.keywords.is_empty()
            && !self.keywords.iter().any(|k| body.contains(&k.to_lowercase()))
        {
            return false;
        }
        if self
            .ignore_words
            .iter()
            .any(|w| body.contains(&w.to_lowercase()))
        {
            return false;
        }

        if let Some(start) = self.start {
            if message.timestamp < start {
                return false;
            }
        }
        let end = self.end.unwrap_or(now);
        message.timestamp <= end
    }

    pub fn matches(&self, message: &CandidateMessage) -> bool {
        self.matches_at(message, Utc::now())
    }
}

/// Read-only message source (the device inbox, a file, a test fixture).
///
/// Implementations may pre-filter on the query or return a superset; the
/// `MessageFilter` re-applies the predicate either way.
pub trait MessageStore: Send + Sync {
    /// Whether the message-read capability has been granted.
    fn has_read_permission(&self) -> bool;

    /// Messages matching (at least a superset of) the query.
    fn query(&self, query: &MessageQuery) -> Result<Vec<CandidateMessage>>;
}

/// Applies a `MessageQuery` against a `MessageStore` and returns candidates
/// newest-first.
pub struct MessageFilter {
    query: MessageQuery,
}

impl MessageFilter {
    pub fn new(query: MessageQuery) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &MessageQuery {
        &self.query
    }

    /// Fetch and filter candidates.
    ///
    /// A missing read grant is fatal to the whole run, not per-item.
    pub fn fetch_candidates(&self, store: &dyn MessageStore) -> Result<Vec<CandidateMessage>> {
        if self.query.senders.is_empty() {
            return Err(Error::InvalidData(
                "Message filter requires at least one sender".into(),
            ));
        }
        if !store.has_read_permission() {
            return Err(Error::PermissionDenied(
                "message store read capability not granted".into(),
            ));
        }

        let now = Utc::now();
        let mut candidates: Vec<CandidateMessage> = store
            .query(&self.query)?
            .into_iter()
            .filter(|m| self.query.matches_at(m, now))
            .collect();
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        debug!(count = candidates.len(), "Filtered candidate messages");
        Ok(candidates)
    }
}

/// In-memory message store.
///
/// Backs tests and the CLI's file-based inbox. Returns everything and lets
/// the filter do the work.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Vec<CandidateMessage>,
    permission_granted: bool,
}

impl MemoryMessageStore {
    pub fn new(messages: Vec<CandidateMessage>) -> Self {
        Self {
            messages,
            permission_granted: true,
        }
    }

    /// A store whose read grant is absent (for precondition tests).
    pub fn without_permission(messages: Vec<CandidateMessage>) -> Self {
        Self {
            messages,
            permission_granted: false,
        }
    }

    pub fn push(&mut self, message: CandidateMessage) {
        self.messages.push(message);
    }
}

impl MessageStore for MemoryMessageStore {
    fn has_read_permission(&self) -> bool {
        self.permission_granted
    }

    fn query(&self, _query: &MessageQuery) -> Result<Vec<CandidateMessage>> {
        Ok(self.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(id: &str, address: &str, body: &str, ts: DateTime<Utc>) -> CandidateMessage {
        CandidateMessage {
            id: id.into(),
            address: address.into(),
            body: body.into(),
            timestamp: ts,
        }
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_sender_substring_match() {
        let q = MessageQuery::new(vec!["qnb".into()]);
        let now = ts(6, 12);
        assert!(q.matches_at(&msg("1", "QNB-Alert", "spent 10", ts(5, 9)), now));
        assert!(!q.matches_at(&msg("2", "Vodafone", "spent 10", ts(5, 9)), now));
    }

    #[test]
    fn test_keyword_and_ignore_lists() {
        let q = MessageQuery::new(vec!["bank".into()])
            .with_keywords(vec!["debited".into(), "purchase".into()])
            .with_ignore_words(vec!["otp".into()]);
        let now = ts(6, 12);

        assert!(q.matches_at(&msg("1", "MyBank", "Purchase of QAR 30", ts(5, 9)), now));
        assert!(!q.matches_at(&msg("2", "MyBank", "Your balance is QAR 900", ts(5, 9)), now));
        assert!(!q.matches_at(&msg("3", "MyBank", "Purchase OTP is 1234", ts(5, 9)), now));
    }

    #[test]
    fn test_date_range_inclusive_with_default_end() {
        let q = MessageQuery::new(vec!["bank".into()]).with_range(Some(ts(3, 0)), None);
        let now = ts(6, 12);

        assert!(q.matches_at(&msg("1", "MyBank", "x", ts(3, 0)), now));
        assert!(q.matches_at(&msg("2", "MyBank", "x", ts(6, 12)), now));
        assert!(!q.matches_at(&msg("3", "MyBank", "x", ts(2, 23)), now));
        // After "now" with no explicit end
        assert!(!q.matches_at(&msg("4", "MyBank", "x", ts(6, 13)), now));
    }

    #[test]
    fn test_candidates_newest_first() {
        let store = MemoryMessageStore::new(vec![
            msg("old", "MyBank", "debited 1", ts(1, 8)),
            msg("new", "MyBank", "debited 2", ts(5, 8)),
            msg("mid", "MyBank", "debited 3", ts(3, 8)),
        ]);
        let filter = MessageFilter::new(MessageQuery::new(vec!["bank".into()]));
        let out = filter.fetch_candidates(&store).unwrap();
        let ids: Vec<&str> = out.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_permission_denied_is_fatal() {
        let store = MemoryMessageStore::without_permission(vec![]);
        let filter = MessageFilter::new(MessageQuery::new(vec!["bank".into()]));
        let err = filter.fetch_candidates(&store).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_empty_sender_list_rejected() {
        let store = MemoryMessageStore::new(vec![]);
        let filter = MessageFilter::new(MessageQuery::new(vec![]));
        assert!(matches!(
            filter.fetch_candidates(&store).unwrap_err(),
            Error::InvalidData(_)
        ));
    }
}
