//! LLM-backed enrichment over an OpenAI-compatible chat API.
//!
//! One short completion call per operation; results are parsed as
//! bullet lines. Any transport or parse problem surfaces as an
//! `EnrichError` and degrades to empty output upstream.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::enrich::Enrichment;
use crate::error::EnrichError;
use crate::mail::NormalizedEmail;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_BULLETS: usize = 3;
const MAX_TODOS: usize = 5;
// Keep request bodies small; long mails summarize fine from the head.
const MAX_BODY_CHARS: usize = 4000;

/// Settings for the LLM enrichment backend.
#[derive(Clone)]
pub struct LlmEnrichmentConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
}

impl LlmEnrichmentConfig {
    /// Load from environment variables. Returns `None` when no API key
    /// is configured, which selects the heuristic backend.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MAILSWEEP_OPENAI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("MAILSWEEP_OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_base: std::env::var("MAILSWEEP_OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

/// Chat-completions client for summaries and todo extraction.
pub struct LlmEnrichment {
    client: reqwest::Client,
    config: LlmEnrichmentConfig,
}

impl LlmEnrichment {
    pub fn new(config: LlmEnrichmentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_base)
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, EnrichError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0,
        });

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EnrichError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(EnrichError::RequestFailed(format!(
                "status {status}: {text}"
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EnrichError::InvalidResponse("missing message content".into()))
    }

    fn email_excerpt(email: &NormalizedEmail) -> String {
        let body: String = email.body_text.chars().take(MAX_BODY_CHARS).collect();
        format!(
            "Subject: {}\nFrom: {}\n\n{}",
            email.subject, email.from, body
        )
    }
}

/// Parse bullet lines out of a completion, tolerating `-`, `*`, `•`
/// and numbered prefixes.
fn parse_bullets(text: &str, cap: usize) -> Vec<String> {
    let mut bullets = Vec::new();
    for line in text.lines() {
        if bullets.len() >= cap {
            break;
        }
        let cleaned = line
            .trim()
            .trim_start_matches(['-', '*', '•'])
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start_matches(['.', ')'])
            .trim();
        if !cleaned.is_empty() {
            bullets.push(cleaned.to_string());
        }
    }
    bullets
}

#[async_trait]
impl Enrichment for LlmEnrichment {
    async fn summarize(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
        let content = self
            .complete(
                "You summarize emails. Reply with at most three short bullet lines, \
                 one fact per line, no preamble.",
                &Self::email_excerpt(email),
            )
            .await?;
        Ok(parse_bullets(&content, MAX_BULLETS))
    }

    async fn extract_todos(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
        let content = self
            .complete(
                "You extract action items the recipient must do. Reply with one \
                 bullet line per action item, or an empty reply if there are none.",
                &Self::email_excerpt(email),
            )
            .await?;
        Ok(parse_bullets(&content, MAX_TODOS))
    }
}
