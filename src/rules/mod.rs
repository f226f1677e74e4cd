//! Ordered rule engine producing a classification verdict.
//!
//! Rules are trait objects evaluated in list order: the first match
//! wins and evaluation stops. The set always ends with the no-fit
//! catch-all, so `classify` returns a matched verdict for every email.

pub mod builtin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RuleError;
use crate::mail::NormalizedEmail;

pub use builtin::{JobApplicationRule, NewsletterRule, SecurityAlertRule};

// ── Category ────────────────────────────────────────────────────────

/// Classification category produced by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    JobApplication,
    Newsletter,
    NoFit,
}

impl Category {
    /// Short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::JobApplication => "job_application",
            Self::Newsletter => "newsletter",
            Self::NoFit => "no_fit",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Rule trait ──────────────────────────────────────────────────────

/// Outcome of a single rule's evaluation when it matched.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// Why the rule matched, for logs and stage derivation.
    pub reason: String,
    pub category: Category,
    /// Label hints in declaration order.
    pub labels: Vec<String>,
    pub confidence: f32,
}

/// A single classification rule.
///
/// Implementations must be deterministic over the email content and
/// free of side effects; the engine relies on both.
pub trait Rule: Send + Sync {
    /// Stable rule name used in verdicts and logs.
    fn name(&self) -> &'static str;

    /// `Ok(Some(..))` when the rule matches. An error is fatal to the
    /// message being classified, never to the run.
    fn evaluate(&self, email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError>;
}

// ── Verdict ─────────────────────────────────────────────────────────

/// Verdict for one email: which rule won and what it declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    /// Always true: the no-fit catch-all guarantees a match.
    pub matched: bool,
    pub rule_name: String,
    pub reason: String,
    pub confidence: f32,
    pub category: Category,
    /// Deduplicated, first-seen order.
    pub labels: Vec<String>,
}

// ── No-fit catch-all ────────────────────────────────────────────────

pub const NO_FIT_RULE_NAME: &str = "no-fit";
pub const NO_FIT_LABEL: &str = "Uncategorized";

/// Mandatory lowest-priority rule; matches everything.
#[derive(Debug, Default)]
struct NoFitRule;

impl Rule for NoFitRule {
    fn name(&self) -> &'static str {
        NO_FIT_RULE_NAME
    }

    fn evaluate(&self, _email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError> {
        Ok(Some(RuleMatch {
            reason: "no rule matched".into(),
            category: Category::NoFit,
            labels: vec![NO_FIT_LABEL.to_string()],
            confidence: 0.0,
        }))
    }
}

// ── Rule set ────────────────────────────────────────────────────────

/// Priority-ordered rule set. Position is priority; the ordered list
/// itself is the configuration, nothing is registered at runtime.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
    no_fit: NoFitRule,
}

impl RuleSet {
    /// Build a set from rules in priority order. The no-fit catch-all
    /// is always present after the given rules.
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self {
            rules,
            no_fit: NoFitRule,
        }
    }

    /// The built-in rule set: security alerts, job applications,
    /// newsletters, then no-fit.
    pub fn default_rules() -> Self {
        Self::new(vec![
            Box::new(SecurityAlertRule::new()),
            Box::new(JobApplicationRule::new()),
            Box::new(NewsletterRule::new()),
        ])
    }

    /// A set holding only the no-fit catch-all (for testing).
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of rules excluding the catch-all.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify one email: walk rules in order, first match wins.
    pub fn classify(&self, email: &NormalizedEmail) -> Result<RuleResult, RuleError> {
        for rule in &self.rules {
            if let Some(hit) = rule.evaluate(email)? {
                debug!(
                    id = %email.message_id,
                    rule = rule.name(),
                    reason = %hit.reason,
                    "Rule matched"
                );
                return Ok(Self::verdict(rule.name(), hit));
            }
        }

        // Guaranteed to match.
        match self.no_fit.evaluate(email)? {
            Some(hit) => Ok(Self::verdict(self.no_fit.name(), hit)),
            None => unreachable!("no-fit rule matches every email"),
        }
    }

    fn verdict(rule_name: &str, hit: RuleMatch) -> RuleResult {
        let mut labels: Vec<String> = Vec::with_capacity(hit.labels.len());
        for label in hit.labels {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        RuleResult {
            matched: true,
            rule_name: rule_name.to_string(),
            reason: hit.reason,
            confidence: hit.confidence.clamp(0.0, 1.0),
            category: hit.category,
            labels,
        }
    }
}
