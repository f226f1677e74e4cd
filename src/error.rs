//! Error types for mailsweep.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rule evaluation errors. A rule failure is fatal to the message
/// being classified, never to the run.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid pattern in rule {rule}: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("Rule {rule} failed: {reason}")]
    EvaluationFailed { rule: String, reason: String },
}

/// Enrichment (summary/todo) errors. Always swallowed by the
/// orchestrator; they degrade to empty results.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Enrichment request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid enrichment response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-message pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(#[from] RuleError),
}

/// Action execution errors, isolated per action by the executor.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Marker IO error: {0}")]
    Marker(#[from] std::io::Error),

    #[error("Marker serialization error: {0}")]
    MarkerFormat(#[from] serde_json::Error),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider request failed with status {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Draft build failed: {0}")]
    DraftBuild(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// True for the deleted-between-list-and-fetch case the run
    /// coordinator skips and counts instead of failing on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Run state persistence errors. Fatal to the run: never proceed
/// with an unknown watermark.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("State schema version {found} is newer than supported version {supported}")]
    Schema { found: u32, supported: u32 },
}

/// Run-level errors that move the coordinator to FAILED, plus the
/// already-running rejection.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Provider fetch failed: {0}")]
    Fetch(#[from] ProviderError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
