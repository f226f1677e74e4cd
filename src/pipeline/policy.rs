//! Policy mapper — turns an analysis result into mailbox actions.
//!
//! Pure and deterministic: same analysis and email always yield the
//! same ordered action list. All label de-duplication and archive
//! gating happens here; the executor just dispatches.

use serde_json::json;

use crate::actions::Action;
use crate::mail::{NormalizedEmail, reply_subject};
use crate::pipeline::types::EmailAnalysis;
use crate::rules::builtin::{APPLICATIONS_LABEL, JobStage};
use crate::rules::{Category, NO_FIT_LABEL};

/// Canonical label per category. The winning rule usually declares
/// this label itself; the table guarantees it even for a rule that
/// declares none.
fn canonical_label(category: Category) -> &'static str {
    match category {
        Category::Security => "Security",
        Category::JobApplication => APPLICATIONS_LABEL,
        Category::Newsletter => "Newsletter",
        Category::NoFit => NO_FIT_LABEL,
    }
}

/// Categories whose messages leave the inbox after labeling.
fn is_archivable(category: Category) -> bool {
    matches!(category, Category::Newsletter | Category::NoFit)
}

/// Map one analysis to an ordered action list.
///
/// Ordering contract: label actions first, then archive (or its
/// low-confidence downgrade), then draft creation. Labels already on
/// the message are omitted so the executor's side effects are exact.
pub fn actions_from_analysis(
    analysis: &EmailAnalysis,
    email: &NormalizedEmail,
    archive_min_confidence: f32,
) -> Vec<Action> {
    let mut actions = Vec::new();
    let reason = format!("rule {} ({})", analysis.source_rule, analysis.category);

    for label in labels_to_apply(analysis, email) {
        actions.push(Action::add_label(&email.message_id, &label, reason.clone()));
    }

    if is_archivable(analysis.category) {
        if analysis.confidence >= archive_min_confidence {
            actions.push(Action::archive(
                &email.message_id,
                format!("{} auto-archive", analysis.category),
            ));
        } else {
            actions.push(Action::analyze_only(
                &email.message_id,
                format!(
                    "archive suppressed: confidence {:.2} below {:.2}",
                    analysis.confidence, archive_min_confidence
                ),
            ));
        }
    }

    if analysis.category == Category::JobApplication {
        let interview_label = format!(
            "{APPLICATIONS_LABEL}/{}",
            JobStage::Interview.label_suffix()
        );
        if analysis.labels.iter().any(|l| l == &interview_label) {
            actions.push(Action::create_draft(
                &email.message_id,
                draft_payload(email),
                "interview invitation reply",
            ));
        }
    }

    actions
}

/// Resolve the labels to add: canonical label plus the rule's own
/// declarations, deduplicated in first-seen order, parents dropped in
/// favor of nested children, already-present labels omitted.
fn labels_to_apply(analysis: &EmailAnalysis, email: &NormalizedEmail) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(analysis.labels.len() + 1);
    candidates.push(canonical_label(analysis.category).to_string());
    for label in &analysis.labels {
        let trimmed = label.trim();
        if !trimmed.is_empty() && !candidates.iter().any(|c| c == trimmed) {
            candidates.push(trimmed.to_string());
        }
    }

    let mut labels = Vec::with_capacity(candidates.len());
    for label in &candidates {
        let prefix = format!("{label}/");
        let has_child = candidates
            .iter()
            .any(|other| other != label && other.starts_with(&prefix));
        if !has_child && !email.has_label(label) {
            labels.push(label.clone());
        }
    }
    labels
}

fn draft_payload(email: &NormalizedEmail) -> serde_json::Value {
    json!({
        "to": email.from_address(),
        "subject": reply_subject(&email.subject),
        "body": interview_reply_body(),
        "thread_id": email.thread_id,
    })
}

/// Fixed reply template for interview invitations; kept short so the
/// user edits the draft rather than trusting generated prose.
fn interview_reply_body() -> String {
    [
        "Hallo,",
        "",
        "vielen Dank für die Einladung zum Vorstellungsgespräch.",
        "Ich freue mich auf das Gespräch.",
        "",
        "Mit freundlichen Grüßen",
    ]
    .join("\n")
}
