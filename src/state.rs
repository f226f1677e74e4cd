//! Persisted run state — the watermark separating processed from
//! unprocessed mail.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateError;

/// Schema version this binary writes. A file carrying a newer version
/// fails the load instead of being reinterpreted.
pub const SCHEMA_VERSION: u32 = 1;

/// The single durable record.
///
/// `last_internal_date_ms = None` is the only trigger for a bootstrap
/// run; deleting the state file is the documented way to force one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub last_internal_date_ms: Option<i64>,
    pub run_counter: i64,
    pub schema_version: u32,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            last_internal_date_ms: None,
            run_counter: 0,
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Loads and atomically saves the run state at a fixed path.
///
/// No locking here: serializing access is the run coordinator's job,
/// this store only guarantees a reader never sees a partial write.
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file → default state (bootstrap mode).
    pub async fn load(&self) -> Result<RunState, StateError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                return Ok(RunState::default());
            }
            Err(e) => return Err(StateError::Io(e)),
        };

        let state: RunState = serde_json::from_str(&raw)?;
        if state.schema_version > SCHEMA_VERSION {
            return Err(StateError::Schema {
                found: state.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(state)
    }

    /// Write to a sibling temp file, then rename over the target, so a
    /// crash mid-save never leaves a half-written record behind.
    pub async fn save(&self, state: &RunState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            watermark = ?state.last_internal_date_ms,
            run = state.run_counter,
            "State saved"
        );
        Ok(())
    }
}
