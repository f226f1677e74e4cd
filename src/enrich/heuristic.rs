//! Pure heuristic enrichment, the default backend.
//!
//! Deterministic over the email content: snippet-first summaries and
//! line-oriented todo detection, no I/O.

use async_trait::async_trait;
use regex::Regex;

use crate::enrich::Enrichment;
use crate::error::EnrichError;
use crate::mail::NormalizedEmail;

const MAX_BULLETS: usize = 3;
const MAX_BULLET_CHARS: usize = 200;
const MAX_TODOS: usize = 5;

/// Snippet/sentence summarizer plus todo-line scanner.
pub struct HeuristicEnrichment {
    whitespace: Regex,
    sentence_end: Regex,
    todo_prefix: Regex,
    checkbox: Regex,
    request_prefix: Regex,
}

impl HeuristicEnrichment {
    pub fn new() -> Self {
        Self {
            whitespace: Regex::new(r"\s+").unwrap(),
            sentence_end: Regex::new(r"[.!?]\s+").unwrap(),
            todo_prefix: Regex::new(r"(?i)^(todo:|to do:)").unwrap(),
            checkbox: Regex::new(r"^[-*]\s*\[ \]").unwrap(),
            request_prefix: Regex::new(r"(?i)^(please|bitte)\b").unwrap(),
        }
    }

    /// Prefer the snippet, then the first body sentences, deduplicated
    /// and capped at three bullets.
    pub fn summarize_text(&self, snippet: &str, body_text: &str) -> Vec<String> {
        let mut bullets: Vec<String> = Vec::new();

        let cleaned = self.clean(snippet);
        if !cleaned.is_empty() {
            bullets.push(truncate(&cleaned));
        }
        if bullets.len() >= MAX_BULLETS {
            return bullets;
        }

        let text = self.clean(body_text);
        if text.is_empty() {
            return bullets;
        }

        for sentence in self.sentence_end.split(&text) {
            if bullets.len() >= MAX_BULLETS {
                break;
            }
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let bullet = truncate(sentence);
            if !bullets.contains(&bullet) {
                bullets.push(bullet);
            }
        }

        bullets
    }

    /// Scan subject and body lines for todo markers, checkboxes and
    /// request phrasing. Kept strict to avoid false positives.
    pub fn todos_from_text(&self, subject: &str, body_text: &str) -> Vec<String> {
        let text = format!("{subject}\n{body_text}");
        let mut todos: Vec<String> = Vec::new();

        for line in text.lines() {
            if todos.len() >= MAX_TODOS {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.todo_prefix.is_match(line)
                || self.checkbox.is_match(line)
                || self.request_prefix.is_match(line)
            {
                todos.push(line.to_string());
            }
        }

        todos
    }

    fn clean(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}

impl Default for HeuristicEnrichment {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_BULLET_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_BULLET_CHARS).collect()
    }
}

#[async_trait]
impl Enrichment for HeuristicEnrichment {
    async fn summarize(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
        Ok(self.summarize_text(&email.snippet, &email.body_text))
    }

    async fn extract_todos(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
        Ok(self.todos_from_text(&email.subject, &email.body_text))
    }
}
