//! Shared types for the analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::rules::Category;

/// Neutral analysis result for one email.
///
/// The single hand-off artifact between classification and the action
/// policy. Immutable once built; the policy mapper only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub category: Category,
    /// Labels declared by the winning rule, deduplicated, first-seen order.
    pub labels: Vec<String>,
    /// Up to a few short bullet lines describing the mail.
    pub summary: Vec<String>,
    /// Heuristic action items found in subject or body.
    pub todos: Vec<String>,
    /// Confidence of the winning rule, in [0, 1].
    pub confidence: f32,
    /// Name of the rule that produced the verdict.
    pub source_rule: String,
}
