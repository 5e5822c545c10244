//! Engine lifecycle states.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::git::ConflictInfo;

/// `Stopped → Starting → Running ⇄ Paused → Stopping → Stopped`.
/// `Failed` is terminal until the engine is reinitialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Failed(String),
}

impl EngineState {
    /// The background loop exists in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Settings may only be replaced while nothing is running.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
            Self::Stopping => f.write_str("stopping"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Why the loop stopped syncing on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum PauseReason {
    Conflict(ConflictInfo),
    Timeout { operation: String, timeout: Duration },
}

impl PauseReason {
    pub fn conflict(&self) -> Option<&ConflictInfo> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            Self::Timeout { .. } => None,
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(conflict) => write!(f, "{}", conflict),
            Self::Timeout { operation, timeout } => {
                write!(f, "{} timed out after {:?}", operation, timeout)
            }
        }
    }
}

/// How `stop()` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopOutcome {
    /// The loop acknowledged the shutdown signal in time.
    Graceful,
    /// The loop was torn down after the stop timeout elapsed.
    Forced,
}
