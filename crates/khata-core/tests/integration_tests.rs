//! Integration tests for khata-core
//!
//! These tests exercise the full filter → extract → persist → recurrence →
//! reminder workflow, plus the HTTP backend against the mock AI server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use khata_core::{
    ai::{AiBackend, GeminiBackend, MockBackend},
    budget::{period_key, BudgetMonitor},
    db::Database,
    error::{AiError, Error},
    filter::{MemoryMessageStore, MessageFilter, MessageQuery},
    models::{CandidateMessage, RecurringType, SyncState},
    sync::SyncOrchestrator,
    tasks::InMemoryScheduler,
    test_utils::{MockAiServer, MockFailure},
    AiClient, PipelineConfig, RateLimiter,
};

/// A subscription charge message `days_ago` days in the past.
fn subscription_message(id: &str, days_ago: i64) -> CandidateMessage {
    CandidateMessage {
        id: id.into(),
        address: "QNB-Alert".into(),
        body: "Subscription renewal of QAR 39.00 at OSN".into(),
        timestamp: Utc::now() - ChronoDuration::days(days_ago),
    }
}

fn build_orchestrator(
    store: MemoryMessageStore,
    ai: AiClient,
    db: &Database,
    scheduler: Arc<InMemoryScheduler>,
) -> SyncOrchestrator {
    let mut config = PipelineConfig::default();
    config.limiter.base_delay = Duration::from_millis(1);
    config.sync.retry_backoff = Duration::from_millis(1);
    SyncOrchestrator::new(
        Arc::new(store),
        MessageFilter::new(
            MessageQuery::new(vec!["qnb".into()]).with_keywords(vec![
                "renewal".into(),
                "spent".into(),
                "used for".into(),
            ]),
        ),
        ai,
        db.clone(),
        Arc::new(RateLimiter::from_config(&config.limiter)),
        scheduler,
        config,
    )
}

// =============================================================================
// Pipeline Integration Tests
// =============================================================================

#[tokio::test]
async fn test_full_sync_recurrence_and_reminder_workflow() {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let scheduler = Arc::new(InMemoryScheduler::new());

    // Three monthly charges: 70, 40, and 10 days ago
    let store = MemoryMessageStore::new(vec![
        subscription_message("m1", 70),
        subscription_message("m2", 40),
        subscription_message("m3", 10),
    ]);
    let orchestrator = build_orchestrator(store, AiClient::mock(), &db, scheduler.clone());

    let report = orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .expect("Sync failed");

    assert_eq!(report.state, SyncState::Completed);
    assert_eq!(report.persisted, 3);
    assert_eq!(db.count_expenses().unwrap(), 3);

    // The newest OSN expense carries the cadence and a next date one month
    // after its payment date
    let history = db.expenses_for_merchant("OSN").unwrap();
    let newest = history.last().unwrap();
    assert_eq!(newest.recurring_type, RecurringType::Monthly);
    let expected_next = RecurringType::Monthly.advance(newest.payment_date);
    assert_eq!(newest.next_recurring_date, expected_next);

    // One pending payment reminder for the merchant, in the future
    let task = scheduler
        .pending("payment:osn")
        .expect("No payment reminder scheduled");
    assert!(task.fire_at > Utc::now());
}

#[tokio::test]
async fn test_sync_is_idempotent_across_runs() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(InMemoryScheduler::new());
    let store = MemoryMessageStore::new(vec![
        subscription_message("m1", 40),
        subscription_message("m2", 10),
    ]);
    let orchestrator = build_orchestrator(store, AiClient::mock(), &db, scheduler);

    let first = orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.persisted, 2);
    assert_eq!(second.persisted, 0);
    assert_eq!(db.count_expenses().unwrap(), 2);
}

#[tokio::test]
async fn test_budget_warning_raised_once_after_sync() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(InMemoryScheduler::new());

    // Two charges landing today, well over a 50 QAR budget
    let store = MemoryMessageStore::new(vec![
        subscription_message("m1", 0),
        CandidateMessage {
            id: "m2".into(),
            address: "QNB-Alert".into(),
            body: "Card used for QAR 75.50 at LULU HYPERMARKET".into(),
            timestamp: Utc::now(),
        },
    ]);
    let orchestrator = build_orchestrator(store, AiClient::mock(), &db, scheduler.clone());

    db.upsert_budget(&period_key(Utc::now().date_naive()), 50.0)
        .unwrap();
    orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .unwrap();

    let monitor = BudgetMonitor::new(db.clone(), scheduler.clone());
    assert!(monitor.check_current().unwrap());
    // Second trigger is suppressed while the warning is pending
    assert!(!monitor.check_current().unwrap());
    let budget_tasks = scheduler
        .pending_tasks()
        .into_iter()
        .filter(|t| t.merchant.is_none())
        .count();
    assert_eq!(budget_tasks, 1);
}

#[tokio::test]
async fn test_per_item_failure_keeps_batch_alive() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(InMemoryScheduler::new());
    let mut bad = subscription_message("m2", 20);
    bad.body = "renewal garbled beyond recognition".into();
    let store = MemoryMessageStore::new(vec![
        subscription_message("m1", 40),
        bad,
        subscription_message("m3", 10),
    ]);
    let mock = MockBackend::new().with_parse_failure_marker("garbled");
    let orchestrator = build_orchestrator(store, AiClient::Mock(mock), &db, scheduler);

    let report = orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, SyncState::Completed);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.skipped, 1);
}

// =============================================================================
// HTTP Backend Tests (mock AI server)
// =============================================================================

fn message_for_extraction() -> CandidateMessage {
    CandidateMessage {
        id: "m1".into(),
        address: "QNB-Alert".into(),
        body: "Card used for QAR 42.50 at MOCK MART".into(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_gemini_backend_extracts_against_mock_server() {
    let server = MockAiServer::start().await;
    let backend = GeminiBackend::new(&server.url(), "test-key", "gemini-test");

    let draft = backend
        .extract_expense(&message_for_extraction())
        .await
        .expect("Extraction failed");

    assert_eq!(draft.amount, 42.5);
    assert_eq!(draft.merchant, "Mock Mart");
}

#[tokio::test]
async fn test_gemini_backend_chat_against_mock_server() {
    let server = MockAiServer::start().await;
    let backend = GeminiBackend::new(&server.url(), "test-key", "gemini-test");

    let reply = backend.chat(&[], "How much did I spend?").await.unwrap();
    assert_eq!(reply, "This is a mock assistant reply.");
}

#[tokio::test]
async fn test_gemini_backend_maps_provider_failures() {
    let server = MockAiServer::start().await;
    let backend = GeminiBackend::new(&server.url(), "test-key", "gemini-test");
    let message = message_for_extraction();

    let cases = [
        (MockFailure::Quota, "quota"),
        (MockFailure::ServerError, "server"),
        (MockFailure::Blocked, "blocked"),
        (MockFailure::Stopped, "stopped"),
        (MockFailure::BadApiKey, "credentials"),
    ];

    for (failure, label) in cases {
        server.force(failure);
        let err = backend
            .extract_expense(&message)
            .await
            .expect_err("Expected a provider failure");
        let ai_err = match err {
            Error::Ai(e) => e,
            other => panic!("Expected AI error for {}, got {}", label, other),
        };
        match failure {
            MockFailure::Quota => assert!(matches!(ai_err, AiError::QuotaExceeded)),
            MockFailure::ServerError => assert!(matches!(ai_err, AiError::Server(_))),
            MockFailure::Blocked => assert!(matches!(ai_err, AiError::PromptBlocked(_))),
            MockFailure::Stopped => assert!(matches!(ai_err, AiError::ResponseStopped(_))),
            MockFailure::BadApiKey => assert!(matches!(ai_err, AiError::InvalidCredentials)),
        }
    }

    server.reset();
    assert!(backend.extract_expense(&message).await.is_ok());
}

#[tokio::test]
async fn test_sync_run_with_http_backend() {
    let server = MockAiServer::start().await;
    let backend = GeminiBackend::new(&server.url(), "test-key", "gemini-test");

    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(InMemoryScheduler::new());
    let store = MemoryMessageStore::new(vec![message_for_extraction()]);
    let orchestrator =
        build_orchestrator(store, AiClient::Gemini(backend), &db, scheduler);

    let report = orchestrator
        .sync_once(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, SyncState::Completed);
    assert_eq!(report.persisted, 1);
    let expense = &db.list_expenses(1, 0).unwrap()[0];
    assert_eq!(expense.merchant, "Mock Mart");
    assert_eq!(expense.amount, 42.5);
}
