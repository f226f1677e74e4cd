//! Mail provider capability surface.
//!
//! The run coordinator and the action executor only ever talk to
//! `MailProvider`; the Gmail client is one implementation behind it.
//! Tests substitute mocks.

pub mod auth;
pub mod gmail;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::mail::RawMessage;

pub use auth::TokenStore;
pub use gmail::{GmailClient, GmailConfig};

// ── Listing window ──────────────────────────────────────────────────

/// Which slice of the mailbox a run scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWindow {
    /// No watermark yet: fixed trailing window of whole days.
    Bootstrap { days: u32 },
    /// Incremental: messages after the persisted watermark.
    After { internal_date_ms: i64 },
}

// ── Draft request ───────────────────────────────────────────────────

/// Everything needed to create a reply draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Thread to attach the draft to, if the provider supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

// ── Provider trait ──────────────────────────────────────────────────

/// Mailbox operations the core consumes. Implementations handle
/// transport and auth; the core never sees HTTP.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Authenticated account address, used to skip self-sent mail.
    async fn profile(&self) -> Result<String, ProviderError>;

    /// Candidate message ids for the window, newest listing order,
    /// capped at `max_results`.
    async fn list_candidate_ids(
        &self,
        window: QueryWindow,
        max_results: u32,
    ) -> Result<Vec<String>, ProviderError>;

    /// Full message fetch. `ProviderError::NotFound` when the message
    /// was deleted or moved between listing and fetch.
    async fn fetch_full(&self, id: &str) -> Result<RawMessage, ProviderError>;

    async fn apply_label(&self, id: &str, label: &str) -> Result<(), ProviderError>;

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), ProviderError>;

    /// Take the message out of the inbox without deleting it.
    async fn archive(&self, id: &str) -> Result<(), ProviderError>;

    /// Create a draft, returning the provider's draft id.
    async fn create_draft(&self, request: &DraftRequest) -> Result<String, ProviderError>;
}
