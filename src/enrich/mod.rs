//! Enrichment services: summaries and action items.
//!
//! Enrichment is optional by contract. The orchestrator swallows any
//! error from here and substitutes empty results, so implementations
//! can fail freely without blocking classification.

pub mod heuristic;
pub mod llm;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EnrichError;
use crate::mail::NormalizedEmail;

pub use heuristic::HeuristicEnrichment;
pub use llm::{LlmEnrichment, LlmEnrichmentConfig};

/// Capability interface for summarization and todo extraction.
#[async_trait]
pub trait Enrichment: Send + Sync {
    /// Up to a few bullet strings describing the email.
    async fn summarize(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError>;

    /// Imperative-looking action items found in the email.
    async fn extract_todos(&self, email: &NormalizedEmail) -> Result<Vec<String>, EnrichError>;
}

/// Select the enrichment backend: the LLM client when configured,
/// otherwise the pure heuristics.
pub fn create_enrichment(config: Option<LlmEnrichmentConfig>) -> Arc<dyn Enrichment> {
    match config {
        Some(config) => {
            tracing::info!(model = %config.model, "Enrichment: LLM backend");
            Arc::new(LlmEnrichment::new(config))
        }
        None => {
            tracing::info!("Enrichment: heuristic backend");
            Arc::new(HeuristicEnrichment::new())
        }
    }
}
