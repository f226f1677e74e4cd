//! Gmail OAuth token storage.
//!
//! Loads the token record written by Google's OAuth tooling from the
//! secrets directory and exchanges the refresh token for a new access
//! token when the cached one is near expiry. The interactive consent
//! flow is out of scope; the token file must already exist.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ProviderError;

/// Token file name inside the secrets directory.
pub const TOKEN_FILE: &str = "gmail_token.json";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// On-disk record, field names as Google's tooling writes them.
#[derive(Debug, Deserialize)]
struct TokenRecord {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

struct AccessToken {
    secret: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

struct RefreshContext {
    token_uri: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
}

/// Bearer token source for the Gmail client. Refreshes lazily and keeps
/// the secret material wrapped until the moment a request is signed.
pub struct TokenStore {
    path: PathBuf,
    http: reqwest::Client,
    access: RwLock<AccessToken>,
    refresh: Option<RefreshContext>,
}

impl TokenStore {
    /// Load `gmail_token.json` from the secrets directory.
    pub async fn load(secrets_dir: &Path) -> Result<Self, ProviderError> {
        let path = secrets_dir.join(TOKEN_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProviderError::Auth(format!("cannot read {}: {e}", path.display())))?;
        let record: TokenRecord = serde_json::from_str(&raw)?;
        Ok(Self::from_record(path, record))
    }

    fn from_record(path: PathBuf, record: TokenRecord) -> Self {
        let refresh = match (record.refresh_token, record.client_id, record.client_secret) {
            (Some(refresh_token), Some(client_id), Some(client_secret)) => Some(RefreshContext {
                token_uri: record.token_uri,
                client_id,
                client_secret: SecretString::from(client_secret),
                refresh_token: SecretString::from(refresh_token),
            }),
            _ => None,
        };
        if refresh.is_none() {
            debug!(path = %path.display(), "Token file has no refresh credentials");
        }

        Self {
            path,
            http: reqwest::Client::new(),
            access: RwLock::new(AccessToken {
                secret: SecretString::from(record.token),
                expires_at: record.expiry.as_deref().and_then(parse_expiry),
            }),
            refresh,
        }
    }

    /// Current bearer token, refreshed first when near expiry.
    pub async fn bearer(&self) -> Result<SecretString, ProviderError> {
        {
            let access = self.access.read().await;
            if !is_stale(access.expires_at) {
                return Ok(access.secret.clone());
            }
        }
        self.refresh_access().await
    }

    async fn refresh_access(&self) -> Result<SecretString, ProviderError> {
        let mut access = self.access.write().await;
        // Another caller may have refreshed while we waited.
        if !is_stale(access.expires_at) {
            return Ok(access.secret.clone());
        }

        let Some(refresh) = &self.refresh else {
            return Err(ProviderError::Auth(format!(
                "access token expired and {} has no refresh credentials",
                self.path.display()
            )));
        };

        let params = [
            ("client_id", refresh.client_id.as_str()),
            ("client_secret", refresh.client_secret.expose_secret()),
            ("refresh_token", refresh.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&refresh.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::Auth(format!(
                "token refresh failed with status {status}: {text}"
            )));
        }

        let body: serde_json::Value = serde_json::from_str(&text)?;
        let token = body.get("access_token").and_then(|t| t.as_str()).ok_or_else(|| {
            ProviderError::InvalidResponse("refresh response has no access_token".to_string())
        })?;
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .unwrap_or(3600);

        access.secret = SecretString::from(token.to_string());
        access.expires_at = Some(Utc::now() + Duration::seconds(expires_in));
        info!("Gmail access token refreshed");
        Ok(access.secret.clone())
    }
}

fn is_stale(expires_at: Option<DateTime<Utc>>) -> bool {
    match expires_at {
        Some(at) => at - Duration::seconds(EXPIRY_MARGIN_SECS) <= Utc::now(),
        None => false,
    }
}

/// Google's tooling writes either RFC 3339 or a naive UTC timestamp.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
