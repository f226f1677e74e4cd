//! Runtime configuration.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Application configuration, built once at startup and passed into the
/// run coordinator and its collaborators. No component reads the
/// environment after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the persisted run state record.
    pub state_path: PathBuf,
    /// Directory holding provider credentials and tokens.
    pub secrets_dir: PathBuf,
    /// Directory for rolling log files (serve mode).
    pub logs_dir: PathBuf,
    /// Directory for draft marker files.
    pub markers_dir: PathBuf,
    /// Trailing window of a bootstrap run, in days.
    pub bootstrap_days: u32,
    /// Maximum candidate ids fetched per run.
    pub max_results: u32,
    /// Minimum confidence required to keep an archive action.
    pub archive_min_confidence: f32,
    /// Dashboard HTTP port.
    pub http_port: u16,
    /// Log and record actions without touching the mailbox.
    pub dry_run: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data/state.json"),
            secrets_dir: PathBuf::from("secrets"),
            logs_dir: PathBuf::from("logs"),
            markers_dir: PathBuf::from("data/markers"),
            bootstrap_days: 60,
            max_results: 500,
            archive_min_confidence: 0.5,
            http_port: 8787,
            dry_run: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `MAILSWEEP_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            state_path: env_path("MAILSWEEP_STATE_PATH", defaults.state_path),
            secrets_dir: env_path("MAILSWEEP_SECRETS_DIR", defaults.secrets_dir),
            logs_dir: env_path("MAILSWEEP_LOGS_DIR", defaults.logs_dir),
            markers_dir: env_path("MAILSWEEP_MARKERS_DIR", defaults.markers_dir),
            bootstrap_days: env_parse("MAILSWEEP_BOOTSTRAP_DAYS", defaults.bootstrap_days)?,
            max_results: env_parse("MAILSWEEP_MAX_RESULTS", defaults.max_results)?,
            archive_min_confidence: env_parse(
                "MAILSWEEP_ARCHIVE_MIN_CONFIDENCE",
                defaults.archive_min_confidence,
            )?,
            http_port: env_parse("MAILSWEEP_HTTP_PORT", defaults.http_port)?,
            dry_run: env_flag("MAILSWEEP_DRY_RUN"),
        })
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
