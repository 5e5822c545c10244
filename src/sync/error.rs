use std::time::Duration;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::file_watcher::MonitorError;
use crate::git::{ConflictInfo, GitError, GitErrorCode, RepoError};

use super::state::EngineState;

/// Everything the engine reports to its callers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Remote unreachable; the loop retries with backoff.
    #[error("network error: {0}")]
    Network(String),

    /// Needs manual resolution followed by `resolve_and_resume`.
    #[error("conflict: {0}")]
    Conflict(ConflictInfo),

    #[error("invalid setting `{field}`: {message}")]
    Configuration { field: String, message: String },

    #[error("cannot move {requested} step(s), only {available} available")]
    OutOfRange { requested: usize, available: usize },

    #[error("checkpoint {0} does not exist")]
    NotFound(i64),

    #[error("{operation} did not finish within {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("git error: {0}")]
    Git(GitError),

    #[error("checkpoint store error: {0}")]
    Checkpoint(#[source] CheckpointError),

    #[error("file monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("a sync cycle is already in progress")]
    Busy,

    #[error("cannot {operation} while the engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Maps a git failure of a network-bound operation, turning the
    /// adapter's timeout into [`SyncError::Timeout`] with the bound applied.
    pub(crate) fn from_git(err: GitError, operation: &str, timeout: Duration) -> Self {
        match err.code {
            GitErrorCode::Timeout => Self::Timeout {
                operation: operation.to_string(),
                timeout,
            },
            _ => err.into(),
        }
    }

    pub(crate) fn from_repo(err: RepoError, operation: &str, timeout: Duration) -> Self {
        match err {
            RepoError::Conflict(conflict) => Self::Conflict(conflict),
            RepoError::Git(e) => Self::from_git(e, operation, timeout),
        }
    }

    /// Cleared by the engine itself on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Busy)
    }
}

impl From<GitError> for SyncError {
    fn from(err: GitError) -> Self {
        match err.code {
            GitErrorCode::Network => Self::Network(err.message),
            _ => Self::Git(err),
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(conflict) => Self::Conflict(conflict),
            RepoError::Git(e) => e.into(),
        }
    }
}

impl From<CheckpointError> for SyncError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::OutOfRange {
                requested,
                available,
            } => Self::OutOfRange {
                requested,
                available,
            },
            CheckpointError::NotFound(id) => Self::NotFound(id),
            other => Self::Checkpoint(other),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        let field = err.field().to_string();
        let message = match err {
            ConfigError::Missing { .. } => "required setting is missing".to_string(),
            ConfigError::Invalid { message, .. } => message,
        };
        Self::Configuration { field, message }
    }
}
