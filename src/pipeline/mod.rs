//! Per-message analysis pipeline.
//!
//! Every fetched message flows through:
//! 1. `RuleSet::classify()` — ordered matchers, first match wins
//! 2. `Analyzer::analyze()` — verdict plus summary/todo enrichment
//! 3. `actions_from_analysis()` — pure mapping to mailbox actions
//!
//! Only classification can fail a message; enrichment degrades to
//! empty output and the policy mapper is total.

pub mod analyzer;
pub mod policy;
pub mod types;

pub use analyzer::Analyzer;
pub use policy::actions_from_analysis;
pub use types::EmailAnalysis;
