//! Shared run status for the HTTP surface.
//!
//! A single `RunStatusStore` lives for the whole process. The coordinator
//! writes phase transitions, counters, and recent activity into it; the
//! status endpoint reads a snapshot without touching the run lock. Recent
//! activity is kept newest-first in bounded rings so a long run cannot
//! grow the snapshot without limit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Maximum entries kept in each recent-activity ring.
pub const RECENT_CAP: usize = 50;

// ── Phases ───────────────────────────────────────────────────────────

/// Where the coordinator currently is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    ResolvingWindow,
    FetchingIds,
    Processing,
    AdvancingState,
    Done,
    Failed,
}

impl RunPhase {
    /// Coarse lifecycle bucket for dashboards that only care whether a
    /// run is active.
    pub fn state(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Done => "done",
            RunPhase::Failed => "error",
            _ => "running",
        }
    }

    /// Machine-readable phase name.
    pub fn step(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::ResolvingWindow => "resolving_window",
            RunPhase::FetchingIds => "fetching_ids",
            RunPhase::Processing => "processing",
            RunPhase::AdvancingState => "advancing_state",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

// ── Snapshot types ───────────────────────────────────────────────────

/// Counters for the run in progress (or the last finished one).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub message_ids_seen: usize,
    pub processed: usize,
    pub skipped_deleted: usize,
    pub errors: usize,
}

/// One non-failed action, as shown in the activity feed. `outcome` is
/// `"done"` for executed actions and the skip reason otherwise, so
/// dry-run entries still show up.
#[derive(Debug, Clone, Serialize)]
pub struct RecentAction {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub outcome: String,
}

/// One failure, kept alongside enough context to identify the message.
#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub error: String,
}

/// Point-in-time copy of the run status, serialized as-is for the API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Id of the current (or last) run, absent before the first run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub state: &'static str,
    pub step: &'static str,
    pub detail: String,
    pub metrics: RunMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    pub recent_actions: Vec<RecentAction>,
    pub recent_errors: Vec<RecentError>,
    pub updated_at: DateTime<Utc>,
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StatusInner {
    run_id: Option<Uuid>,
    phase: RunPhase,
    detail: String,
    metrics: RunMetrics,
    summary: Option<serde_json::Value>,
    recent_actions: VecDeque<RecentAction>,
    recent_errors: VecDeque<RecentError>,
    updated_at: DateTime<Utc>,
}

/// Concurrent status holder. Writers hold the lock only long enough to
/// patch the fields they own; readers always get a consistent copy.
#[derive(Debug)]
pub struct RunStatusStore {
    inner: RwLock<StatusInner>,
}

impl RunStatusStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatusInner {
                run_id: None,
                phase: RunPhase::Idle,
                detail: String::new(),
                metrics: RunMetrics::default(),
                summary: None,
                recent_actions: VecDeque::new(),
                recent_errors: VecDeque::new(),
                updated_at: Utc::now(),
            }),
        }
    }

    /// Start a fresh run: new run id, counters and activity rings reset
    /// so nothing from the previous run shows up in this run's snapshot
    /// or summary.
    pub async fn begin_run(&self) {
        let mut inner = self.inner.write().await;
        inner.run_id = Some(Uuid::new_v4());
        inner.phase = RunPhase::ResolvingWindow;
        inner.detail = "Loading state".to_string();
        inner.metrics = RunMetrics::default();
        inner.summary = None;
        inner.recent_actions.clear();
        inner.recent_errors.clear();
        inner.updated_at = Utc::now();
    }

    pub async fn set_phase(&self, phase: RunPhase, detail: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.phase = phase;
        inner.detail = detail.into();
        inner.updated_at = Utc::now();
    }

    pub async fn set_detail(&self, detail: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.detail = detail.into();
        inner.updated_at = Utc::now();
    }

    pub async fn set_metrics(&self, metrics: RunMetrics) {
        let mut inner = self.inner.write().await;
        inner.metrics = metrics;
        inner.updated_at = Utc::now();
    }

    /// Record a finished run: phase, final counters, and the summary the
    /// trigger endpoint returned.
    pub async fn finish(&self, phase: RunPhase, detail: impl Into<String>, summary: Option<serde_json::Value>) {
        let mut inner = self.inner.write().await;
        inner.phase = phase;
        inner.detail = detail.into();
        inner.summary = summary;
        inner.updated_at = Utc::now();
    }

    /// Prepend to the action feed, newest first.
    pub async fn push_action(&self, entry: RecentAction) {
        let mut inner = self.inner.write().await;
        inner.recent_actions.push_front(entry);
        inner.recent_actions.truncate(RECENT_CAP);
        inner.updated_at = Utc::now();
    }

    /// Prepend to the error feed, newest first.
    pub async fn push_error(&self, entry: RecentError) {
        let mut inner = self.inner.write().await;
        inner.recent_errors.push_front(entry);
        inner.recent_errors.truncate(RECENT_CAP);
        inner.updated_at = Utc::now();
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        StatusSnapshot {
            run_id: inner.run_id,
            state: inner.phase.state(),
            step: inner.phase.step(),
            detail: inner.detail.clone(),
            metrics: inner.metrics,
            summary: inner.summary.clone(),
            recent_actions: inner.recent_actions.iter().cloned().collect(),
            recent_errors: inner.recent_errors.iter().cloned().collect(),
            updated_at: inner.updated_at,
        }
    }

    /// Current rings, newest first. Used to attach recent activity to a
    /// run summary without a second bookkeeping pass.
    pub async fn recent(&self) -> (Vec<RecentAction>, Vec<RecentError>) {
        let inner = self.inner.read().await;
        (
            inner.recent_actions.iter().cloned().collect(),
            inner.recent_errors.iter().cloned().collect(),
        )
    }
}

impl Default for RunStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_action(n: usize) -> RecentAction {
        RecentAction {
            message_id: format!("msg-{n}"),
            from: "sender@example.com".to_string(),
            subject: format!("Subject {n}"),
            action: "add_label".to_string(),
            label: Some("Newsletter".to_string()),
            outcome: "done".to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_store_is_idle() {
        let store = RunStatusStore::new();
        let snap = store.snapshot().await;

        assert_eq!(snap.state, "idle");
        assert_eq!(snap.step, "idle");
        assert!(snap.run_id.is_none());
        assert_eq!(snap.metrics, RunMetrics::default());
        assert!(snap.recent_actions.is_empty());
        assert!(snap.summary.is_none());
    }

    #[tokio::test]
    async fn phase_maps_to_coarse_state() {
        let store = RunStatusStore::new();

        store.set_phase(RunPhase::Processing, "Processing 1/3").await;
        let snap = store.snapshot().await;
        assert_eq!(snap.state, "running");
        assert_eq!(snap.step, "processing");
        assert_eq!(snap.detail, "Processing 1/3");

        store.set_phase(RunPhase::Failed, "boom").await;
        assert_eq!(store.snapshot().await.state, "error");
    }

    #[tokio::test]
    async fn begin_run_clears_previous_counters() {
        let store = RunStatusStore::new();
        store
            .set_metrics(RunMetrics {
                processed: 9,
                ..Default::default()
            })
            .await;
        store.finish(RunPhase::Done, "Run completed", Some(serde_json::json!({"processed": 9}))).await;

        store.begin_run().await;
        let snap = store.snapshot().await;

        assert_eq!(snap.step, "resolving_window");
        assert!(snap.run_id.is_some());
        assert_eq!(snap.metrics.processed, 0);
        assert!(snap.summary.is_none());
    }

    #[tokio::test]
    async fn begin_run_clears_recent_rings() {
        let store = RunStatusStore::new();
        store.push_action(make_action(1)).await;
        store
            .push_error(RecentError {
                message_id: "msg-1".to_string(),
                from: "a@b.c".to_string(),
                subject: "hello".to_string(),
                action: None,
                error: "timeout".to_string(),
            })
            .await;
        store.finish(RunPhase::Done, "Run completed", None).await;

        store.begin_run().await;
        let snap = store.snapshot().await;

        assert!(snap.recent_actions.is_empty());
        assert!(snap.recent_errors.is_empty());
    }

    #[tokio::test]
    async fn action_ring_is_newest_first_and_bounded() {
        let store = RunStatusStore::new();
        for n in 0..RECENT_CAP + 10 {
            store.push_action(make_action(n)).await;
        }

        let snap = store.snapshot().await;
        assert_eq!(snap.recent_actions.len(), RECENT_CAP);
        assert_eq!(snap.recent_actions[0].message_id, format!("msg-{}", RECENT_CAP + 9));
        assert_eq!(snap.recent_actions.last().map(|a| a.message_id.clone()), Some("msg-10".to_string()));
    }

    #[tokio::test]
    async fn error_ring_keeps_action_context() {
        let store = RunStatusStore::new();
        store
            .push_error(RecentError {
                message_id: "msg-1".to_string(),
                from: "a@b.c".to_string(),
                subject: "hello".to_string(),
                action: Some("archive".to_string()),
                error: "rate limited".to_string(),
            })
            .await;

        let (_, errors) = store.recent().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].action.as_deref(), Some("archive"));
        assert_eq!(errors[0].error, "rate limited");
    }

    #[tokio::test]
    async fn snapshot_serializes_without_empty_optionals() {
        let store = RunStatusStore::new();
        store.push_action(make_action(1)).await;
        let snap = store.snapshot().await;

        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["state"], "idle");
        assert!(value.get("summary").is_none());
        assert_eq!(value["recent_actions"][0]["label"], "Newsletter");
    }
}
