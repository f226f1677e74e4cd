//! Run orchestration.
//!
//! `RunCoordinator` drives one pass over the mailbox: resolve window →
//! fetch candidate ids → per-message processing → advance watermark.
//! `RunStatusStore` is the shared snapshot the dashboard polls while a
//! run is active.

pub mod coordinator;
pub mod status;

pub use coordinator::{RunCoordinator, RunSummary};
pub use status::{RecentAction, RecentError, RunMetrics, RunPhase, RunStatusStore};
