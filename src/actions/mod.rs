//! Mailbox actions — the value objects the policy emits and the
//! executor dispatches.
//!
//! An action list is produced fresh per message and discarded after
//! execution. An action never references a message other than the one
//! it was produced for.

pub mod executor;

use serde::{Deserialize, Serialize};

pub use executor::{ActionExecutor, ActionResult, ActionStatus, ExecutionOutcome};

// ── Action type ─────────────────────────────────────────────────────

/// Closed set of mailbox operations. Every variant has exactly one
/// handler in the executor; the exhaustive match there means a new
/// variant without a handler fails compilation, not a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddLabel,
    RemoveLabel,
    Archive,
    CreateDraft,
    AnalyzeOnly,
    Print,
}

impl ActionType {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddLabel => "add_label",
            Self::RemoveLabel => "remove_label",
            Self::Archive => "archive",
            Self::CreateDraft => "create_draft",
            Self::AnalyzeOnly => "analyze_only",
            Self::Print => "print",
        }
    }

    /// True for variants that change mailbox state. Dry-run skips
    /// exactly these.
    pub fn mutates_mailbox(&self) -> bool {
        match self {
            Self::AddLabel | Self::RemoveLabel | Self::Archive | Self::CreateDraft => true,
            Self::AnalyzeOnly | Self::Print => false,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Action ──────────────────────────────────────────────────────────

/// One concrete mailbox operation for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub message_id: String,
    /// Set for label operations, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_name: Option<String>,
    /// Why the policy emitted this action, for logs and the dashboard.
    pub reason: String,
    /// Action-specific data (e.g. draft fields), absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Action {
    pub fn add_label(message_id: &str, label: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::AddLabel,
            message_id: message_id.to_string(),
            label_name: Some(label.to_string()),
            reason: reason.into(),
            payload: None,
        }
    }

    pub fn remove_label(message_id: &str, label: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::RemoveLabel,
            message_id: message_id.to_string(),
            label_name: Some(label.to_string()),
            reason: reason.into(),
            payload: None,
        }
    }

    pub fn archive(message_id: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Archive,
            message_id: message_id.to_string(),
            label_name: None,
            reason: reason.into(),
            payload: None,
        }
    }

    pub fn create_draft(
        message_id: &str,
        payload: serde_json::Value,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action_type: ActionType::CreateDraft,
            message_id: message_id.to_string(),
            label_name: None,
            reason: reason.into(),
            payload: Some(payload),
        }
    }

    pub fn analyze_only(message_id: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::AnalyzeOnly,
            message_id: message_id.to_string(),
            label_name: None,
            reason: reason.into(),
            payload: None,
        }
    }

    pub fn print(message_id: &str, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Print,
            message_id: message_id.to_string(),
            label_name: None,
            reason: reason.into(),
            payload: None,
        }
    }
}
