//! Action executor — dispatches actions to the provider, one handler
//! per variant.
//!
//! Failure isolation is the core contract: a failed action is recorded
//! in the outcome and the remaining actions for the same message still
//! run. Nothing here aborts a run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::actions::{Action, ActionType};
use crate::error::ActionError;
use crate::provider::{DraftRequest, MailProvider};

// ── Outcome types ───────────────────────────────────────────────────

/// How one action ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Done,
    Skipped { why: String },
    Failed { error: String },
}

/// One action paired with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: Action,
    #[serde(flatten)]
    pub status: ActionStatus,
}

/// Outcome for one message's full action list, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionOutcome {
    pub results: Vec<ActionResult>,
}

impl ExecutionOutcome {
    pub fn failed(&self) -> impl Iterator<Item = &ActionResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ActionStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

// ── Executor ────────────────────────────────────────────────────────

/// Executes the policy's actions against the mail provider.
///
/// Holds exactly the capabilities the handlers need: the provider, the
/// marker directory for draft de-duplication, and the dry-run flag.
pub struct ActionExecutor {
    provider: Arc<dyn MailProvider>,
    markers_dir: PathBuf,
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(provider: Arc<dyn MailProvider>, markers_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            provider,
            markers_dir: markers_dir.into(),
            dry_run,
        }
    }

    /// Execute actions in input order — the policy's ordering is a
    /// contract, never reordered or parallelized within one message.
    pub async fn execute(&self, actions: &[Action]) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::default();

        for action in actions {
            let status = match self.run_action(action).await {
                Ok(status) => status,
                Err(e) => ActionStatus::Failed {
                    error: e.to_string(),
                },
            };

            match &status {
                ActionStatus::Done => info!(
                    id = %action.message_id,
                    action = action.action_type.label(),
                    label = action.label_name.as_deref().unwrap_or(""),
                    reason = %action.reason,
                    "Action done"
                ),
                ActionStatus::Skipped { why } => debug!(
                    id = %action.message_id,
                    action = action.action_type.label(),
                    why = %why,
                    "Action skipped"
                ),
                ActionStatus::Failed { error } => warn!(
                    id = %action.message_id,
                    action = action.action_type.label(),
                    error = %error,
                    "Action failed, continuing"
                ),
            }

            outcome.results.push(ActionResult {
                action: action.clone(),
                status,
            });
        }

        outcome
    }

    /// Exhaustive dispatch: every `ActionType` variant has exactly one
    /// arm, so an unhandled variant cannot compile.
    async fn run_action(&self, action: &Action) -> Result<ActionStatus, ActionError> {
        if self.dry_run && action.action_type.mutates_mailbox() {
            return Ok(ActionStatus::Skipped {
                why: format!("dry-run: would {}", action.action_type.label()),
            });
        }

        match action.action_type {
            ActionType::AddLabel => {
                let label = required_label(action)?;
                self.provider.apply_label(&action.message_id, label).await?;
                Ok(ActionStatus::Done)
            }
            ActionType::RemoveLabel => {
                let label = required_label(action)?;
                self.provider
                    .remove_label(&action.message_id, label)
                    .await?;
                Ok(ActionStatus::Done)
            }
            ActionType::Archive => {
                self.provider.archive(&action.message_id).await?;
                Ok(ActionStatus::Done)
            }
            ActionType::CreateDraft => self.create_draft(action).await,
            ActionType::AnalyzeOnly => Ok(ActionStatus::Skipped {
                why: "analysis only, no mailbox change".into(),
            }),
            ActionType::Print => {
                info!(id = %action.message_id, reason = %action.reason, "Analysis");
                Ok(ActionStatus::Done)
            }
        }
    }

    /// Draft creation with a marker-file guard: a marker written on a
    /// previous run suppresses the duplicate draft.
    async fn create_draft(&self, action: &Action) -> Result<ActionStatus, ActionError> {
        let payload = action.payload.as_ref().ok_or_else(|| {
            ActionError::InvalidAction("create_draft requires a payload".into())
        })?;
        let request: DraftRequest = serde_json::from_value(payload.clone())
            .map_err(|e| ActionError::InvalidAction(format!("create_draft payload: {e}")))?;

        let marker_path = self.marker_path(&action.message_id);
        if tokio::fs::try_exists(&marker_path).await? {
            return Ok(ActionStatus::Skipped {
                why: "draft marker present".into(),
            });
        }

        let draft_id = self.provider.create_draft(&request).await?;

        tokio::fs::create_dir_all(&self.markers_dir).await?;
        let marker = json!({
            "draft_id": draft_id,
            "message_id": action.message_id,
            "created_at": Utc::now().to_rfc3339(),
        });
        tokio::fs::write(&marker_path, serde_json::to_vec_pretty(&marker)?).await?;

        info!(id = %action.message_id, draft_id = %draft_id, "Draft created");
        Ok(ActionStatus::Done)
    }

    fn marker_path(&self, message_id: &str) -> PathBuf {
        self.markers_dir.join(format!("{message_id}.draft.json"))
    }
}

fn required_label(action: &Action) -> Result<&str, ActionError> {
    action.label_name.as_deref().ok_or_else(|| {
        ActionError::InvalidAction(format!("{} requires label_name", action.action_type.label()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::mail::RawMessage;
    use crate::provider::QueryWindow;
    use std::sync::Mutex;

    /// Records provider calls; optionally fails label operations.
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<String>>,
        fail_labels: bool,
    }

    impl RecordingProvider {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MailProvider for RecordingProvider {
        async fn profile(&self) -> Result<String, ProviderError> {
            Ok("me@example.com".into())
        }

        async fn list_candidate_ids(
            &self,
            _window: QueryWindow,
            _max_results: u32,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(vec![])
        }

        async fn fetch_full(&self, id: &str) -> Result<RawMessage, ProviderError> {
            Err(ProviderError::NotFound { id: id.into() })
        }

        async fn apply_label(&self, id: &str, label: &str) -> Result<(), ProviderError> {
            if self.fail_labels {
                return Err(ProviderError::Http {
                    status: 500,
                    reason: "backend unavailable".into(),
                });
            }
            self.calls.lock().unwrap().push(format!("label:{id}:{label}"));
            Ok(())
        }

        async fn remove_label(&self, id: &str, label: &str) -> Result<(), ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("unlabel:{id}:{label}"));
            Ok(())
        }

        async fn archive(&self, id: &str) -> Result<(), ProviderError> {
            self.calls.lock().unwrap().push(format!("archive:{id}"));
            Ok(())
        }

        async fn create_draft(&self, request: &DraftRequest) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("draft:{}", request.to));
            Ok("draft-1".into())
        }
    }

    fn draft_action(message_id: &str) -> Action {
        Action::create_draft(
            message_id,
            json!({
                "to": "recruiter@example.com",
                "subject": "Re: Interview",
                "body": "Hallo,",
                "thread_id": "t1",
            }),
            "interview invitation reply",
        )
    }

    #[tokio::test]
    async fn executes_actions_in_order() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let actions = vec![
            Action::add_label("m1", "Newsletter", "newsletter match"),
            Action::archive("m1", "newsletter auto-archive"),
        ];
        let outcome = executor.execute(&actions).await;

        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.has_failures());
        assert_eq!(
            provider.calls(),
            vec!["label:m1:Newsletter", "archive:m1"]
        );
    }

    #[tokio::test]
    async fn failed_action_does_not_abort_the_rest() {
        let provider = Arc::new(RecordingProvider {
            fail_labels: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let actions = vec![
            Action::add_label("m2", "Security", "security match"),
            Action::archive("m2", "archive anyway"),
        ];
        let outcome = executor.execute(&actions).await;

        assert!(matches!(
            outcome.results[0].status,
            ActionStatus::Failed { .. }
        ));
        assert!(matches!(outcome.results[1].status, ActionStatus::Done));
        // The archive still reached the provider.
        assert_eq!(provider.calls(), vec!["archive:m2"]);
    }

    #[tokio::test]
    async fn missing_label_name_is_an_invalid_action() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let mut action = Action::add_label("m3", "x", "r");
        action.label_name = None;
        let outcome = executor.execute(&[action]).await;

        match &outcome.results[0].status {
            ActionStatus::Failed { error } => assert!(error.contains("label_name")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn analyze_only_is_a_recorded_noop() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let outcome = executor
            .execute(&[Action::analyze_only("m4", "archive suppressed")])
            .await;

        assert!(matches!(
            outcome.results[0].status,
            ActionStatus::Skipped { .. }
        ));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_every_mutating_action() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), true);

        let actions = vec![
            Action::add_label("m5", "Newsletter", "r"),
            Action::archive("m5", "r"),
            draft_action("m5"),
        ];
        let outcome = executor.execute(&actions).await;

        assert!(outcome.results.iter().all(|r| matches!(
            r.status,
            ActionStatus::Skipped { .. }
        )));
        assert!(provider.calls().is_empty());
        // Dry-run must not leave a marker behind either.
        assert!(!dir.path().join("m5.draft.json").exists());
    }

    #[tokio::test]
    async fn draft_marker_suppresses_duplicate() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let first = executor.execute(&[draft_action("m6")]).await;
        assert!(matches!(first.results[0].status, ActionStatus::Done));
        assert!(dir.path().join("m6.draft.json").exists());

        let second = executor.execute(&[draft_action("m6")]).await;
        match &second.results[0].status {
            ActionStatus::Skipped { why } => assert!(why.contains("marker")),
            other => panic!("expected Skipped, got {other:?}"),
        }

        // Exactly one draft reached the provider.
        assert_eq!(provider.calls(), vec!["draft:recruiter@example.com"]);
    }

    #[tokio::test]
    async fn marker_records_draft_id() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        executor.execute(&[draft_action("m7")]).await;

        let raw = std::fs::read_to_string(dir.path().join("m7.draft.json")).unwrap();
        let marker: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(marker["draft_id"], "draft-1");
        assert_eq!(marker["message_id"], "m7");
        assert!(marker["created_at"].is_string());
    }

    #[tokio::test]
    async fn remove_label_dispatches() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let outcome = executor
            .execute(&[Action::remove_label("m8", "Newsletter", "manual cleanup")])
            .await;

        assert!(matches!(outcome.results[0].status, ActionStatus::Done));
        assert_eq!(provider.calls(), vec!["unlabel:m8:Newsletter"]);
    }

    #[tokio::test]
    async fn print_logs_without_provider_calls() {
        let provider = Arc::new(RecordingProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let executor = ActionExecutor::new(provider.clone(), dir.path(), false);

        let outcome = executor
            .execute(&[Action::print("m9", "job application, stage interview")])
            .await;

        assert!(matches!(outcome.results[0].status, ActionStatus::Done));
        assert!(provider.calls().is_empty());
    }
}
