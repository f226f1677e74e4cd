//! Analysis orchestrator — classification plus enrichment.
//!
//! Classification is the only fatal step for a message. Summaries and
//! todos are best-effort: an enrichment failure degrades to empty
//! output and never blocks labeling or archiving.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::enrich::Enrichment;
use crate::error::PipelineError;
use crate::mail::NormalizedEmail;
use crate::pipeline::types::EmailAnalysis;
use crate::rules::RuleSet;

/// Combines the rule verdict with summary and todo extraction into one
/// analysis result per message.
pub struct Analyzer {
    rules: RuleSet,
    enricher: Arc<dyn Enrichment>,
}

impl Analyzer {
    pub fn new(rules: RuleSet, enricher: Arc<dyn Enrichment>) -> Self {
        Self { rules, enricher }
    }

    /// Analyze one message.
    ///
    /// A rule-engine failure propagates and is fatal to this message
    /// only. Enrichment runs regardless of which rule matched, so a
    /// no-fit email still gets a summary.
    pub async fn analyze(&self, email: &NormalizedEmail) -> Result<EmailAnalysis, PipelineError> {
        let verdict = self.rules.classify(email)?;
        debug!(
            id = %email.message_id,
            rule = %verdict.rule_name,
            category = %verdict.category,
            confidence = verdict.confidence,
            "Classified"
        );

        let summary = match self.enricher.summarize(email).await {
            Ok(bullets) => bullets,
            Err(e) => {
                warn!(id = %email.message_id, error = %e, "Summarization failed, continuing without summary");
                Vec::new()
            }
        };

        let todos = match self.enricher.extract_todos(email).await {
            Ok(items) => items,
            Err(e) => {
                warn!(id = %email.message_id, error = %e, "Todo extraction failed, continuing without todos");
                Vec::new()
            }
        };

        Ok(EmailAnalysis {
            category: verdict.category,
            labels: verdict.labels,
            summary,
            todos,
            confidence: verdict.confidence,
            source_rule: verdict.rule_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::HeuristicEnrichment;
    use crate::error::{EnrichError, RuleError};
    use crate::mail::Headers;
    use crate::rules::{Category, NO_FIT_RULE_NAME, Rule, RuleMatch};

    fn make_email(from: &str, subject: &str, body: &str) -> NormalizedEmail {
        NormalizedEmail {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            subject: subject.into(),
            from: from.into(),
            to: "me@example.com".into(),
            date: None,
            snippet: String::new(),
            body_text: body.into(),
            internal_date_ms: 1000,
            headers: Headers::new(),
            raw_label_ids: vec![],
        }
    }

    struct FixedEnrichment {
        summary: Vec<String>,
        todos: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Enrichment for FixedEnrichment {
        async fn summarize(&self, _email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
            Ok(self.summary.clone())
        }

        async fn extract_todos(
            &self,
            _email: &NormalizedEmail,
        ) -> Result<Vec<String>, EnrichError> {
            Ok(self.todos.clone())
        }
    }

    struct FailingEnrichment;

    #[async_trait::async_trait]
    impl Enrichment for FailingEnrichment {
        async fn summarize(&self, _email: &NormalizedEmail) -> Result<Vec<String>, EnrichError> {
            Err(EnrichError::RequestFailed("enrichment offline".into()))
        }

        async fn extract_todos(
            &self,
            _email: &NormalizedEmail,
        ) -> Result<Vec<String>, EnrichError> {
            Err(EnrichError::RequestFailed("enrichment offline".into()))
        }
    }

    struct BrokenRule;

    impl Rule for BrokenRule {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn evaluate(&self, _email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError> {
            Err(RuleError::EvaluationFailed {
                rule: "broken".into(),
                reason: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn analysis_merges_verdict_and_enrichment() {
        let analyzer = Analyzer::new(
            RuleSet::default_rules(),
            Arc::new(FixedEnrichment {
                summary: vec!["Security alert from provider".into()],
                todos: vec!["Check recent sign-ins".into()],
            }),
        );

        let email = make_email(
            "no-reply@accounts.example.com",
            "Security Alert: new sign-in",
            "A new sign-in was detected.",
        );
        let analysis = analyzer.analyze(&email).await.unwrap();

        assert!(matches!(analysis.category, Category::Security));
        assert_eq!(analysis.labels, vec!["Security"]);
        assert_eq!(analysis.source_rule, "security-alert");
        assert_eq!(analysis.summary, vec!["Security alert from provider"]);
        assert_eq!(analysis.todos, vec!["Check recent sign-ins"]);
        assert!(analysis.confidence > 0.5);
    }

    #[tokio::test]
    async fn enrichment_failure_degrades_to_empty() {
        let analyzer = Analyzer::new(RuleSet::default_rules(), Arc::new(FailingEnrichment));

        let email = make_email(
            "no-reply@accounts.example.com",
            "Security Alert: new sign-in",
            "A new sign-in was detected.",
        );
        let analysis = analyzer.analyze(&email).await.unwrap();

        // Classification survives the enricher outage.
        assert!(matches!(analysis.category, Category::Security));
        assert!(analysis.summary.is_empty());
        assert!(analysis.todos.is_empty());
    }

    #[tokio::test]
    async fn no_fit_email_still_gets_enrichment() {
        let analyzer = Analyzer::new(
            RuleSet::empty(),
            Arc::new(FixedEnrichment {
                summary: vec!["Plain personal mail".into()],
                todos: vec![],
            }),
        );

        let email = make_email("friend@example.com", "Lunch?", "Want to grab lunch later?");
        let analysis = analyzer.analyze(&email).await.unwrap();

        assert_eq!(analysis.source_rule, NO_FIT_RULE_NAME);
        assert!(matches!(analysis.category, Category::NoFit));
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(analysis.summary, vec!["Plain personal mail"]);
    }

    #[tokio::test]
    async fn rule_failure_propagates() {
        let analyzer = Analyzer::new(
            RuleSet::new(vec![Box::new(BrokenRule)]),
            Arc::new(FixedEnrichment {
                summary: vec![],
                todos: vec![],
            }),
        );

        let email = make_email("a@b.com", "anything", "anything");
        let result = analyzer.analyze(&email).await;
        assert!(matches!(result, Err(PipelineError::Classification(_))));
    }

    #[tokio::test]
    async fn analysis_is_deterministic() {
        let analyzer = Analyzer::new(RuleSet::default_rules(), Arc::new(HeuristicEnrichment::new()));

        let email = make_email(
            "jobs@greenhouse.io",
            "Your application",
            "Thank you for applying. We received your application.\n\nPlease send your references.",
        );

        let first = analyzer.analyze(&email).await.unwrap();
        let second = analyzer.analyze(&email).await.unwrap();

        assert_eq!(first.source_rule, second.source_rule);
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.todos, second.todos);
        assert_eq!(first.confidence, second.confidence);
    }
}
