//! The canonical message shape every downstream component consumes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mail::body;

// ── Headers ─────────────────────────────────────────────────────────

/// Header map with case-insensitive keys. Duplicate headers keep the
/// last value, matching provider payload order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ── Raw provider message ────────────────────────────────────────────

/// Envelope plus payload tree as returned by the mail provider.
///
/// The provider resolves label ids to display names before handing the
/// message over; everything else stays untouched for normalization.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub thread_id: String,
    pub internal_date_ms: i64,
    pub snippet: String,
    pub label_names: Vec<String>,
    pub payload: serde_json::Value,
}

// ── Normalized email ────────────────────────────────────────────────

/// Canonical email shape. Immutable once built; the run coordinator
/// owns it for the duration of one message's processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    /// Raw From header ("Jane Doe <jane@example.com>").
    pub from: String,
    /// Raw To header.
    pub to: String,
    /// Parsed Date header, when present and well-formed.
    pub date: Option<DateTime<Utc>>,
    /// Provider-supplied preview text.
    pub snippet: String,
    pub body_text: String,
    /// Provider-internal receive timestamp, the watermark currency.
    pub internal_date_ms: i64,
    pub headers: Headers,
    /// Label names currently on the message.
    pub raw_label_ids: Vec<String>,
}

impl NormalizedEmail {
    /// Build the canonical shape from a raw provider message.
    pub fn from_raw(raw: RawMessage) -> Self {
        let headers = collect_headers(&raw.payload);
        let subject = headers.get("subject").unwrap_or_default().to_string();
        let from = headers.get("from").unwrap_or_default().to_string();
        let to = headers.get("to").unwrap_or_default().to_string();
        let date = headers.get("date").and_then(parse_date);
        let body_text = body::extract_text(&raw.payload);

        Self {
            message_id: raw.id,
            thread_id: raw.thread_id,
            subject,
            from,
            to,
            date,
            snippet: raw.snippet,
            body_text,
            internal_date_ms: raw.internal_date_ms,
            headers,
            raw_label_ids: raw.label_names,
        }
    }

    /// Bare sender address, lowercased ("jane@example.com").
    pub fn from_address(&self) -> String {
        normalize_address(&self.from)
    }

    /// Case-insensitive check against the message's current labels.
    pub fn has_label(&self, name: &str) -> bool {
        self.raw_label_ids
            .iter()
            .any(|l| l.eq_ignore_ascii_case(name))
    }
}

fn collect_headers(payload: &serde_json::Value) -> Headers {
    let mut headers = Headers::new();
    if let Some(entries) = payload.get("headers").and_then(|h| h.as_array()) {
        for entry in entries {
            if let (Some(name), Some(value)) = (
                entry.get("name").and_then(|n| n.as_str()),
                entry.get("value").and_then(|v| v.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
    }
    headers
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Address and subject helpers ─────────────────────────────────────

/// Reduce a From/To header to the bare address, lowercased.
/// `"Jane Doe <JANE@Example.com>"` → `"jane@example.com"`.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    };
    inner.trim().to_ascii_lowercase()
}

/// Build a reply subject, keeping existing reply prefixes
/// (Re:/AW:/SV:) instead of stacking a new one.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("re:") || lower.starts_with("aw:") || lower.starts_with("sv:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}
