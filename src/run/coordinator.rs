//! One pass over the mailbox.
//!
//! The coordinator owns the run state machine:
//!
//! 1. resolve the query window from the persisted watermark,
//! 2. list candidate ids and fetch the full messages,
//! 3. filter out ineligible messages, process the rest oldest-first,
//! 4. advance the watermark and bump the run counter.
//!
//! A message failing anywhere stays that message's problem; only state
//! loading, candidate listing, and the final state write can fail the
//! whole run. The watermark moves forward or stays put, never back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::actions::{ActionExecutor, ActionStatus, ExecutionOutcome};
use crate::config::AppConfig;
use crate::error::{PipelineError, RunError, StateError};
use crate::mail::{NormalizedEmail, normalize_address};
use crate::pipeline::{Analyzer, actions_from_analysis};
use crate::provider::{MailProvider, QueryWindow};
use crate::run::status::{RecentAction, RecentError, RunMetrics, RunPhase, RunStatusStore};
use crate::state::{RunState, RunStateStore};

// ── Summary ──────────────────────────────────────────────────────────

/// What a finished run produced, returned by the trigger endpoint and
/// printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Messages that survived eligibility filtering.
    pub message_ids_seen: usize,
    /// Messages that went through analysis and execution.
    pub processed: usize,
    /// Listed ids whose message was gone by fetch time.
    pub skipped_deleted: usize,
    pub errors: usize,
    /// Watermark after this run.
    pub latest_internal_date_ms: Option<i64>,
    pub recent_actions: Vec<RecentAction>,
    pub recent_errors: Vec<RecentError>,
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Serializes runs over one mailbox. At most one run is active at a
/// time; a second trigger is rejected instead of queued.
pub struct RunCoordinator {
    config: AppConfig,
    provider: Arc<dyn MailProvider>,
    analyzer: Analyzer,
    executor: ActionExecutor,
    state_store: RunStateStore,
    status: Arc<RunStatusStore>,
    run_lock: Mutex<()>,
    cancel: AtomicBool,
}

impl RunCoordinator {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn MailProvider>,
        analyzer: Analyzer,
        status: Arc<RunStatusStore>,
    ) -> Self {
        let executor = ActionExecutor::new(
            provider.clone(),
            config.markers_dir.clone(),
            config.dry_run,
        );
        let state_store = RunStateStore::new(config.state_path.clone());

        Self {
            config,
            provider,
            analyzer,
            executor,
            state_store,
            status,
            run_lock: Mutex::new(()),
            cancel: AtomicBool::new(false),
        }
    }

    /// Shared status handle, the same one the HTTP surface polls.
    pub fn status(&self) -> Arc<RunStatusStore> {
        self.status.clone()
    }

    /// The persisted run record as it is on disk right now.
    pub async fn persisted_state(&self) -> Result<RunState, StateError> {
        self.state_store.load().await
    }

    /// Ask the active run to stop before its next message. Progress up
    /// to the last completed message is still persisted.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Execute one run. Returns `RunError::AlreadyRunning` without
    /// touching any state when another run holds the lock.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| RunError::AlreadyRunning)?;
        self.cancel.store(false, Ordering::Relaxed);
        self.status.begin_run().await;

        match self.run_inner().await {
            Ok(summary) => {
                info!(
                    processed = summary.processed,
                    errors = summary.errors,
                    skipped_deleted = summary.skipped_deleted,
                    "Run completed"
                );
                let detail = format!(
                    "Processed {} of {} messages",
                    summary.processed, summary.message_ids_seen
                );
                self.status
                    .finish(RunPhase::Done, detail, serde_json::to_value(&summary).ok())
                    .await;
                Ok(summary)
            }
            Err(error) => {
                warn!(error = %error, "Run failed");
                self.status
                    .finish(RunPhase::Failed, error.to_string(), None)
                    .await;
                Err(error)
            }
        }
    }

    async fn run_inner(&self) -> Result<RunSummary, RunError> {
        let mut metrics = RunMetrics::default();

        let state = self.state_store.load().await?;
        let window = match state.last_internal_date_ms {
            Some(internal_date_ms) => QueryWindow::After { internal_date_ms },
            None => QueryWindow::Bootstrap {
                days: self.config.bootstrap_days,
            },
        };
        info!(window = ?window, run_counter = state.run_counter, "Query window resolved");

        self.status
            .set_phase(RunPhase::FetchingIds, describe_window(window))
            .await;
        let candidate_ids = self
            .provider
            .list_candidate_ids(window, self.config.max_results)
            .await?;
        let listed = candidate_ids.len();
        debug!(candidates = listed, "Candidate ids listed");

        // An empty window is a finished run, not a state change.
        if candidate_ids.is_empty() {
            let (recent_actions, recent_errors) = self.status.recent().await;
            return Ok(RunSummary {
                message_ids_seen: 0,
                processed: 0,
                skipped_deleted: 0,
                errors: 0,
                latest_internal_date_ms: state.last_internal_date_ms,
                recent_actions,
                recent_errors,
            });
        }

        self.status
            .set_phase(
                RunPhase::Processing,
                format!("Loading message payloads 0/{listed}"),
            )
            .await;
        let own_address = normalize_address(&self.provider.profile().await?);

        let mut fetched: Vec<NormalizedEmail> = Vec::with_capacity(listed);
        for id in &candidate_ids {
            match self.provider.fetch_full(id).await {
                Ok(raw) => fetched.push(NormalizedEmail::from_raw(raw)),
                Err(error) if error.is_not_found() => {
                    metrics.skipped_deleted += 1;
                    debug!(id = %id, "Message gone between listing and fetch");
                }
                Err(error) => {
                    metrics.errors += 1;
                    warn!(id = %id, error = %error, "Full fetch failed");
                    self.status
                        .push_error(RecentError {
                            message_id: id.clone(),
                            from: String::new(),
                            subject: String::new(),
                            action: None,
                            error: error.to_string(),
                        })
                        .await;
                }
            }
        }

        // Every listed id can be gone by fetch time; with nothing
        // fetched there is nothing to advance past.
        if fetched.is_empty() {
            self.status.set_metrics(metrics).await;
            let (recent_actions, recent_errors) = self.status.recent().await;
            return Ok(RunSummary {
                message_ids_seen: 0,
                processed: 0,
                skipped_deleted: metrics.skipped_deleted,
                errors: metrics.errors,
                latest_internal_date_ms: state.last_internal_date_ms,
                recent_actions,
                recent_errors,
            });
        }

        // Everything fetched counts toward the watermark, eligible or
        // not; on a completed run nothing older will be listed again.
        let max_fetched_ms = fetched.iter().map(|m| m.internal_date_ms).max();

        fetched.sort_by(|a, b| {
            (a.internal_date_ms, a.message_id.as_str())
                .cmp(&(b.internal_date_ms, b.message_id.as_str()))
        });

        let watermark = state.last_internal_date_ms;
        let mut eligible = Vec::with_capacity(fetched.len());
        for mail in fetched {
            if let Some(mark) = watermark
                && mail.internal_date_ms <= mark
            {
                debug!(id = %mail.message_id, "At or below watermark, skipping");
                continue;
            }
            if mail.has_label("DRAFT") {
                debug!(id = %mail.message_id, "Draft, skipping");
                continue;
            }
            if !own_address.is_empty() && mail.from_address() == own_address {
                debug!(id = %mail.message_id, "Own message, skipping");
                continue;
            }
            eligible.push(mail);
        }
        metrics.message_ids_seen = eligible.len();
        self.status.set_metrics(metrics).await;

        let total = eligible.len();
        let mut latest_completed_ms: Option<i64> = None;
        let mut cancelled = false;

        for (index, mail) in eligible.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                info!(
                    processed = metrics.processed,
                    remaining = total - index,
                    "Cancellation requested, stopping before next message"
                );
                cancelled = true;
                break;
            }
            self.status
                .set_detail(format!("Processing {}/{total}", index + 1))
                .await;

            match self.process_message(mail).await {
                Ok(outcome) => {
                    metrics.processed += 1;
                    if outcome.has_failures() {
                        metrics.errors += 1;
                    }
                    self.record_outcome(mail, &outcome).await;
                }
                Err(error) => {
                    metrics.errors += 1;
                    warn!(id = %mail.message_id, error = %error, "Message analysis failed");
                    self.status
                        .push_error(RecentError {
                            message_id: mail.message_id.clone(),
                            from: mail.from.clone(),
                            subject: mail.subject.clone(),
                            action: None,
                            error: error.to_string(),
                        })
                        .await;
                }
            }

            // Eligible list is sorted ascending.
            latest_completed_ms = Some(mail.internal_date_ms);
            self.status.set_metrics(metrics).await;
        }

        self.status
            .set_phase(RunPhase::AdvancingState, "Saving state")
            .await;
        // A cancelled run only advances past messages it finished;
        // anything newer is picked up again next run.
        let advance_to = if cancelled {
            latest_completed_ms
        } else {
            max_fetched_ms
        };
        let mut new_state = state.clone();
        if let Some(ms) = advance_to {
            new_state.last_internal_date_ms = Some(watermark.map_or(ms, |mark| mark.max(ms)));
        }
        new_state.run_counter += 1;
        self.state_store.save(&new_state).await?;
        info!(
            watermark = ?new_state.last_internal_date_ms,
            run_counter = new_state.run_counter,
            "State advanced"
        );

        let (recent_actions, recent_errors) = self.status.recent().await;
        Ok(RunSummary {
            message_ids_seen: metrics.message_ids_seen,
            processed: metrics.processed,
            skipped_deleted: metrics.skipped_deleted,
            errors: metrics.errors,
            latest_internal_date_ms: new_state.last_internal_date_ms,
            recent_actions,
            recent_errors,
        })
    }

    async fn process_message(
        &self,
        mail: &NormalizedEmail,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let analysis = self.analyzer.analyze(mail).await?;
        let actions =
            actions_from_analysis(&analysis, mail, self.config.archive_min_confidence);
        if actions.is_empty() {
            debug!(id = %mail.message_id, "Nothing to do");
            return Ok(ExecutionOutcome::default());
        }
        Ok(self.executor.execute(&actions).await)
    }

    /// Feed executed and skipped actions into the activity ring, failed
    /// ones into the error ring.
    async fn record_outcome(&self, mail: &NormalizedEmail, outcome: &ExecutionOutcome) {
        for result in &outcome.results {
            let action = result.action.action_type.label().to_string();
            match &result.status {
                ActionStatus::Done => {
                    self.status
                        .push_action(RecentAction {
                            message_id: mail.message_id.clone(),
                            from: mail.from.clone(),
                            subject: mail.subject.clone(),
                            action,
                            label: result.action.label_name.clone(),
                            outcome: "done".to_string(),
                        })
                        .await;
                }
                ActionStatus::Skipped { why } => {
                    self.status
                        .push_action(RecentAction {
                            message_id: mail.message_id.clone(),
                            from: mail.from.clone(),
                            subject: mail.subject.clone(),
                            action,
                            label: result.action.label_name.clone(),
                            outcome: why.clone(),
                        })
                        .await;
                }
                ActionStatus::Failed { error } => {
                    self.status
                        .push_error(RecentError {
                            message_id: mail.message_id.clone(),
                            from: mail.from.clone(),
                            subject: mail.subject.clone(),
                            action: Some(action),
                            error: error.clone(),
                        })
                        .await;
                }
            }
        }
    }
}

fn describe_window(window: QueryWindow) -> String {
    match window {
        QueryWindow::Bootstrap { days } => format!("Bootstrap window: last {days} days"),
        QueryWindow::After { internal_date_ms } => {
            format!("Incremental window: after {internal_date_ms}")
        }
    }
}
