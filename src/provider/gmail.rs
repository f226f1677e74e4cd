//! Gmail REST implementation of the mail provider.
//!
//! Plain `reqwest` against the Gmail v1 API. Label names are resolved
//! through a lazily filled name↔id cache; labels the account does not
//! have yet are created on demand with the canonical color table.
//! Archiving is expressed the Gmail way, by removing `INBOX`.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::mail::RawMessage;
use crate::provider::auth::TokenStore;
use crate::provider::{DraftRequest, MailProvider, QueryWindow};
use crate::rules::NO_FIT_LABEL;
use crate::rules::builtin::APPLICATIONS_LABEL;

/// Gmail endpoint configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// API base, overridable for tests.
    pub base_url: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
        }
    }
}

#[derive(Default)]
struct LabelCache {
    /// Lowercased display name → label id.
    by_name: HashMap<String, String>,
    /// Label id → display name.
    by_id: HashMap<String, String>,
}

pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    labels: RwLock<LabelCache>,
    account: RwLock<Option<String>>,
}

impl GmailClient {
    pub fn new(config: GmailConfig, tokens: TokenStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url,
            tokens,
            labels: RwLock::new(LabelCache::default()),
            account: RwLock::new(None),
        }
    }

    // ── HTTP plumbing ────────────────────────────────────────────────

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Self::into_json(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(map_status(status.as_u16(), &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    // ── Label cache ──────────────────────────────────────────────────

    async fn ensure_labels(&self) -> Result<(), ProviderError> {
        if !self.labels.read().await.by_id.is_empty() {
            return Ok(());
        }

        let body = self.get("users/me/labels", &[]).await?;
        let mut cache = self.labels.write().await;
        if !cache.by_id.is_empty() {
            return Ok(());
        }
        if let Some(entries) = body.get("labels").and_then(|l| l.as_array()) {
            for entry in entries {
                if let (Some(id), Some(name)) = (
                    entry.get("id").and_then(|v| v.as_str()),
                    entry.get("name").and_then(|v| v.as_str()),
                ) {
                    cache.by_name.insert(name.to_ascii_lowercase(), id.to_string());
                    cache.by_id.insert(id.to_string(), name.to_string());
                }
            }
        }
        debug!(labels = cache.by_id.len(), "Label cache filled");
        Ok(())
    }

    /// Label id for a display name, creating the label when missing.
    async fn label_id(&self, name: &str) -> Result<String, ProviderError> {
        self.ensure_labels().await?;
        if let Some(id) = self.labels.read().await.by_name.get(&name.to_ascii_lowercase()) {
            return Ok(id.clone());
        }
        self.create_label(name).await
    }

    /// Label id for a display name, `None` when the label does not
    /// exist. Used by removal, which must not create labels.
    async fn lookup_label_id(&self, name: &str) -> Result<Option<String>, ProviderError> {
        self.ensure_labels().await?;
        Ok(self
            .labels
            .read()
            .await
            .by_name
            .get(&name.to_ascii_lowercase())
            .cloned())
    }

    async fn create_label(&self, name: &str) -> Result<String, ProviderError> {
        let mut body = json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        if let Some((background, text)) = label_color(name) {
            body["color"] = json!({"backgroundColor": background, "textColor": text});
        }

        let created = self.post("users/me/labels", &body).await?;
        let id = created.get("id").and_then(|v| v.as_str()).ok_or_else(|| {
            ProviderError::InvalidResponse("label create response has no id".to_string())
        })?;
        info!(label = name, id = %id, "Label created");

        let mut cache = self.labels.write().await;
        cache.by_name.insert(name.to_ascii_lowercase(), id.to_string());
        cache.by_id.insert(id.to_string(), name.to_string());
        Ok(id.to_string())
    }

    async fn resolve_label_names(&self, ids: &[String]) -> Result<Vec<String>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_labels().await?;
        let cache = self.labels.read().await;
        // System labels list under their own id; anything unknown keeps
        // the raw id rather than dropping it.
        Ok(ids
            .iter()
            .map(|id| cache.by_id.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect())
    }

    async fn account_email(&self) -> Result<String, ProviderError> {
        if let Some(address) = self.account.read().await.clone() {
            return Ok(address);
        }
        let address = self.profile().await?;
        *self.account.write().await = Some(address.clone());
        Ok(address)
    }

    async fn modify(&self, id: &str, body: Value) -> Result<(), ProviderError> {
        self.post(&format!("users/me/messages/{id}/modify"), &body)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn profile(&self) -> Result<String, ProviderError> {
        let body = self.get("users/me/profile", &[]).await?;
        body.get("emailAddress")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("profile has no emailAddress".to_string())
            })
    }

    async fn list_candidate_ids(
        &self,
        window: QueryWindow,
        max_results: u32,
    ) -> Result<Vec<String>, ProviderError> {
        let query = window_query(window);
        debug!(query = %query, max_results, "Listing candidate messages");
        let body = self
            .get(
                "users/me/messages",
                &[("q", query), ("maxResults", max_results.to_string())],
            )
            .await?;
        Ok(body
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("id").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_full(&self, id: &str) -> Result<RawMessage, ProviderError> {
        let value = match self
            .get(
                &format!("users/me/messages/{id}"),
                &[("format", "full".to_string())],
            )
            .await
        {
            Err(ProviderError::Http { status: 404, .. }) => {
                return Err(ProviderError::NotFound { id: id.to_string() });
            }
            other => other?,
        };

        let internal_date_ms = value
            .get("internalDate")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("message {id} has no internalDate"))
            })?;
        let label_ids: Vec<String> = value
            .get("labelIds")
            .and_then(|l| l.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let label_names = self.resolve_label_names(&label_ids).await?;

        Ok(RawMessage {
            id: value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or(id)
                .to_string(),
            thread_id: value
                .get("threadId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            internal_date_ms,
            snippet: value
                .get("snippet")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            label_names,
            payload: value.get("payload").cloned().unwrap_or(Value::Null),
        })
    }

    async fn apply_label(&self, id: &str, label: &str) -> Result<(), ProviderError> {
        let label_id = self.label_id(label).await?;
        self.modify(id, json!({"addLabelIds": [label_id]})).await
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), ProviderError> {
        match self.lookup_label_id(label).await? {
            Some(label_id) => self.modify(id, json!({"removeLabelIds": [label_id]})).await,
            None => {
                debug!(id = %id, label = label, "Label does not exist, nothing to remove");
                Ok(())
            }
        }
    }

    async fn archive(&self, id: &str) -> Result<(), ProviderError> {
        self.modify(id, json!({"removeLabelIds": ["INBOX"]})).await
    }

    async fn create_draft(&self, request: &DraftRequest) -> Result<String, ProviderError> {
        let from = self.account_email().await?;
        let raw = build_raw_mime(&from, request)?;

        let mut message = json!({"raw": raw});
        if let Some(thread_id) = &request.thread_id {
            message["threadId"] = Value::String(thread_id.clone());
        }
        let created = self.post("users/me/drafts", &json!({"message": message})).await?;
        created
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("draft create response has no id".to_string())
            })
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────

/// Gmail search expression for a query window. Drafts and own mail are
/// excluded at the query level already; the coordinator re-checks both.
fn window_query(window: QueryWindow) -> String {
    match window {
        QueryWindow::Bootstrap { days } => format!("newer_than:{days}d -in:drafts -from:me"),
        QueryWindow::After { internal_date_ms } => {
            // `after:` has second granularity, so the watermark second is
            // re-listed in full; the coordinator's watermark filter drops
            // anything at or below it.
            format!("after:{} -in:drafts -from:me", internal_date_ms / 1000)
        }
    }
}

/// Colors for the canonical labels; anything else gets Gmail's default.
fn label_color(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        APPLICATIONS_LABEL => Some(("#16a765", "#ffffff")),
        "Security" => Some(("#fb4c2f", "#ffffff")),
        "Newsletter" => Some(("#4986e7", "#ffffff")),
        NO_FIT_LABEL => Some(("#cccccc", "#000000")),
        _ => None,
    }
}

fn map_status(status: u16, body: &str) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited,
        403 if body.contains("rateLimitExceeded") => ProviderError::RateLimited,
        401 | 403 => ProviderError::Auth(format!("status {status}: {}", short(body))),
        _ => ProviderError::Http {
            status,
            reason: short(body),
        },
    }
}

fn short(body: &str) -> String {
    body.chars().take(200).collect()
}

/// RFC 2822 draft body, base64url-encoded the way the drafts endpoint
/// expects it. Threading happens via `threadId` on the JSON side.
fn build_raw_mime(from: &str, request: &DraftRequest) -> Result<String, ProviderError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| ProviderError::DraftBuild(format!("from address: {e}")))?;
    let to: Mailbox = request
        .to
        .parse()
        .map_err(|e| ProviderError::DraftBuild(format!("to address: {e}")))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(request.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(request.body.clone())
        .map_err(|e| ProviderError::DraftBuild(e.to_string()))?;

    Ok(URL_SAFE.encode(message.formatted()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::provider::auth::TOKEN_FILE;

    #[test]
    fn bootstrap_query_uses_trailing_window() {
        let query = window_query(QueryWindow::Bootstrap { days: 60 });
        assert_eq!(query, "newer_than:60d -in:drafts -from:me");
    }

    #[test]
    fn incremental_query_floors_to_seconds() {
        let query = window_query(QueryWindow::After {
            internal_date_ms: 1_700_000_000_500,
        });
        assert_eq!(query, "after:1700000000 -in:drafts -from:me");
    }

    #[test]
    fn incremental_query_keeps_the_watermark_second_visible() {
        // A 2500 ms message is newer than a 2000 ms watermark but lands
        // in the same query second; it must stay inside the window.
        let query = window_query(QueryWindow::After {
            internal_date_ms: 2000,
        });
        assert!(query.starts_with("after:2 "));
        assert!(2500 / 1000 >= 2);
    }

    #[test]
    fn canonical_labels_have_colors() {
        assert!(label_color("Applications").is_some());
        assert!(label_color("Security").is_some());
        assert!(label_color("Newsletter").is_some());
        assert!(label_color("Uncategorized").is_some());
        // Stage children inherit Gmail's default.
        assert!(label_color("Applications/Interview").is_none());
    }

    #[test]
    fn status_mapping_distinguishes_auth_and_rate_limits() {
        assert!(matches!(map_status(401, "bad token"), ProviderError::Auth(_)));
        assert!(matches!(map_status(429, ""), ProviderError::RateLimited));
        assert!(matches!(
            map_status(403, r#"{"error": {"errors": [{"reason": "rateLimitExceeded"}]}}"#),
            ProviderError::RateLimited
        ));
        assert!(matches!(map_status(403, "forbidden"), ProviderError::Auth(_)));
        assert!(matches!(
            map_status(500, "boom"),
            ProviderError::Http { status: 500, .. }
        ));
    }

    #[test]
    fn raw_mime_round_trips_through_base64() {
        let request = DraftRequest {
            to: "jane@example.com".to_string(),
            subject: "Re: Interview".to_string(),
            body: "Hallo,\r\n\r\nvielen Dank.\r\n".to_string(),
            thread_id: Some("t-1".to_string()),
        };

        let raw = build_raw_mime("me@example.com", &request).unwrap();
        let decoded = URL_SAFE.decode(raw).unwrap();
        let text = String::from_utf8_lossy(&decoded);

        assert!(text.contains("To: jane@example.com"));
        assert!(text.contains("Subject: Re: Interview"));
        assert!(text.contains("vielen Dank."));
    }

    #[test]
    fn unparseable_recipient_is_a_draft_build_error() {
        let request = DraftRequest {
            to: "not an address".to_string(),
            subject: "Hello".to_string(),
            body: String::new(),
            thread_id: None,
        };

        let result = build_raw_mime("me@example.com", &request);
        assert!(matches!(result, Err(ProviderError::DraftBuild(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(TOKEN_FILE),
            serde_json::to_vec(&json!({
                "token": "ya29.test",
                "expiry": (Utc::now() + Duration::hours(1)).to_rfc3339(),
            }))
            .unwrap(),
        )
        .unwrap();
        let tokens = TokenStore::load(dir.path()).await.unwrap();

        let client = GmailClient::new(
            GmailConfig {
                base_url: "http://127.0.0.1:9/gmail/v1".to_string(),
            },
            tokens,
        );

        let result = client
            .list_candidate_ids(QueryWindow::Bootstrap { days: 7 }, 10)
            .await;
        assert!(matches!(result, Err(ProviderError::Transport(_))));
    }
}
