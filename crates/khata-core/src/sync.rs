//! Sync orchestrator
//!
//! Drives the end-to-end batch: filter candidates, gate each through the
//! rate limiter, extract, persist, advance recurrence state, emit progress.
//! A run is a single cooperative background task - extraction is strictly
//! sequential because the limiter is one shared gate. At most one run is
//! active at a time; concurrent requests coalesce into the running one.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{AiBackend, AiClient, ExtractedExpense};
use crate::config::PipelineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::filter::{MessageFilter, MessageStore};
use crate::limiter::RateLimiter;
use crate::models::{CandidateMessage, RecurringType, SyncProgress, SyncReport, SyncState};
use crate::recurring::RecurringScheduler;
use crate::tasks::TaskScheduler;

pub struct SyncOrchestrator {
    store: Arc<dyn MessageStore>,
    filter: MessageFilter,
    ai: AiClient,
    db: Database,
    limiter: Arc<RateLimiter>,
    recurring: RecurringScheduler,
    config: PipelineConfig,
    run_lock: Mutex<()>,
    state_tx: watch::Sender<SyncState>,
    progress_tx: watch::Sender<SyncProgress>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        filter: MessageFilter,
        ai: AiClient,
        db: Database,
        limiter: Arc<RateLimiter>,
        scheduler: Arc<dyn TaskScheduler>,
        config: PipelineConfig,
    ) -> Self {
        let recurring =
            RecurringScheduler::new(db.clone(), scheduler, config.reminders.clone());
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (progress_tx, _) = watch::channel(SyncProgress::default());
        Self {
            store,
            filter,
            ai,
            db,
            limiter,
            recurring,
            config,
            run_lock: Mutex::new(()),
            state_tx,
            progress_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Subscribe to live progress updates.
    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// Run one sync pass.
    ///
    /// Entry is exclusive: if a run is already active, the request coalesces
    /// into it and returns immediately with `coalesced = true`. Fatal errors
    /// (credentials, store permission) leave the state at `Failed` and
    /// propagate; the host scheduler retries the run wholesale.
    pub async fn sync_once(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Sync already running, coalescing request");
                return Ok(SyncReport {
                    state: SyncState::Running,
                    coalesced: true,
                    ..Default::default()
                });
            }
        };

        self.state_tx.send_replace(SyncState::Running);
        self.progress_tx.send_replace(SyncProgress::default());

        match self.run(cancel).await {
            Ok(report) => {
                info!(
                    state = %report.state,
                    fetched = report.fetched,
                    persisted = report.persisted,
                    skipped = report.skipped,
                    "Sync finished"
                );
                self.state_tx.send_replace(report.state);
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Sync failed");
                self.state_tx.send_replace(SyncState::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        // Permission check happens inside the filter, before any item work.
        let candidates = self.filter.fetch_candidates(self.store.as_ref())?;

        // The cap keeps the newest candidates; processing runs oldest-first
        // so recurrence state advances chronologically.
        let mut batch: Vec<CandidateMessage> = candidates
            .into_iter()
            .take(self.config.sync.max_items_per_run)
            .collect();
        batch.reverse();

        report.fetched = batch.len();
        self.progress_tx.send_replace(SyncProgress {
            total: batch.len(),
            current: 0,
            message: None,
        });

        let mut current = 0usize;
        for (index, message) in batch.iter().enumerate() {
            // Cooperative checkpoint between items; the in-flight item is
            // never half-persisted because the insert is atomic.
            if cancel.is_cancelled() {
                info!(processed = current, "Sync cancelled");
                report.state = SyncState::Cancelled;
                return Ok(report);
            }

            // Fixed smoothing delay between consecutive AI calls, on top of
            // window admission.
            if index > 0 {
                sleep(self.config.limiter.base_delay).await;
            }
            self.limiter.admit().await;

            match self.extract_with_retry(message).await {
                Ok(draft) => {
                    report.extracted += 1;
                    match self.persist(message, draft) {
                        Ok(true) => {
                            report.persisted += 1;
                            current += 1;
                            self.progress_tx.send_replace(SyncProgress {
                                total: report.fetched,
                                current,
                                message: Some(format!("processed message {}", message.id)),
                            });
                        }
                        Ok(false) => {
                            debug!(message_id = %message.id, "Duplicate message, skipped");
                            report.skipped += 1;
                        }
                        Err(e) if e.is_fatal_to_run() => return Err(e),
                        Err(e) => {
                            // Persistence/validation failures are fatal to
                            // this item only.
                            warn!(message_id = %message.id, error = %e, "Failed to persist expense");
                            report.skipped += 1;
                        }
                    }
                }
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Extraction failed, skipping message");
                    report.skipped += 1;
                }
            }
        }

        report.state = SyncState::Completed;
        Ok(report)
    }

    /// Extraction with bounded retry for quota/timeout failures.
    ///
    /// Each re-attempt goes back through the limiter after a doubling
    /// backoff; non-retryable errors surface immediately.
    async fn extract_with_retry(&self, message: &CandidateMessage) -> Result<ExtractedExpense> {
        let mut backoff = self.config.sync.retry_backoff;
        let mut attempt = 0u32;

        loop {
            match self.ai.extract_expense(message).await {
                Ok(draft) => return Ok(draft),
                Err(Error::Ai(e)) if e.is_retryable() && attempt < self.config.sync.max_retries => {
                    attempt += 1;
                    warn!(
                        message_id = %message.id,
                        attempt,
                        error = %e,
                        "Retryable AI error, backing off"
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                    self.limiter.admit().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate and persist one extraction; advance recurrence state.
    ///
    /// Returns whether a new expense row was inserted (false on dedup hit).
    fn persist(&self, message: &CandidateMessage, draft: ExtractedExpense) -> Result<bool> {
        let new_expense = draft.into_new_expense(message);
        new_expense.validate(Utc::now().date_naive())?;

        let id = match self.db.insert_expense(&new_expense)? {
            Some(id) => id,
            None => return Ok(false),
        };

        // Recurrence bookkeeping never un-persists the expense; failures
        // here are logged and the item still counts as a success.
        if let Err(e) = self.advance_recurrence(id) {
            warn!(expense_id = id, error = %e, "Recurrence update failed");
        }
        Ok(true)
    }

    fn advance_recurrence(&self, id: i64) -> Result<()> {
        let expense = self.db.get_expense(id)?;
        if expense.recurring_type != RecurringType::None {
            self.recurring.process_expense(&expense)?;
        }
        // History may reveal a cadence the extraction hint missed.
        self.recurring.refresh_merchant(&expense.merchant)?;
        Ok(())
    }
}
