/*!
 * 同步协调器
 *
 * Drives the pull/commit/push loop between the working directory and its
 * remote, pauses on conflicts, and navigates the checkpoint log by creating
 * new commits.
 */

pub mod cycle;
pub mod engine;
pub mod error;
pub mod state;
pub mod status;

pub use cycle::{auto_commit_message, backoff_delay, CycleReport};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use state::{EngineState, PauseReason, StopOutcome};
pub use status::{process_memory, EngineStatus, SyncStats};
