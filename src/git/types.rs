use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quarantine::QuarantinedFile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FileChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Conflicted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub status: FileChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

/// Full commit hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the repository taken by one status query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
    pub has_remote_changes: bool,
    pub has_local_changes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub is_dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_conflict: Option<ConflictInfo>,
    /// In-scope changes that an auto-commit would stage.
    pub changed_files: Vec<FileChange>,
    pub untracked_files: Vec<String>,
    pub conflicted_files: Vec<String>,
    /// Set when the remote could not be reached; the remaining fields then
    /// describe the last known remote state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_error: Option<String>,
}

impl RepositoryState {
    pub fn is_network_error(&self) -> bool {
        self.network_error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    MergeConflict,
    UntrackedCollision,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MergeConflict => f.write_str("merge conflict"),
            Self::UntrackedCollision => f.write_str("untracked file collision"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub kind: ConflictKind,
    pub paths: BTreeSet<String>,
    pub detected_at: DateTime<Utc>,
    /// Verbatim output of the failing git command.
    pub message: String,
}

impl ConflictInfo {
    pub fn new(
        kind: ConflictKind,
        paths: impl IntoIterator<Item = String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            paths: paths.into_iter().collect(),
            detected_at: Utc::now(),
            message: message.into(),
        }
    }

    pub fn remediation_hint(&self) -> String {
        let files = if self.paths.is_empty() {
            "the affected files".to_string()
        } else {
            self.paths.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        match self.kind {
            ConflictKind::MergeConflict => format!(
                "Local and remote both changed {}. Merge the remote branch by hand, commit the result, then resume syncing.",
                files
            ),
            ConflictKind::UntrackedCollision => format!(
                "Your untracked copies of {} differ from the versions pulled from the remote. They are kept in quarantine: restore or discard them, then resume syncing.",
                files
            ),
        }
    }
}

impl fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} file(s)", self.kind, self.paths.len())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PullOutcome {
    UpToDate,
    FastForwarded,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub outcome: PullOutcome,
    pub incoming_commits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<CommitRef>,
    /// Quarantined files put back because the merge did not touch their path.
    pub restored: Vec<String>,
    /// Quarantined files whose content the merged file already extends.
    pub retained: Vec<QuarantinedFile>,
    /// Quarantined files whose content diverges from the merged file.
    pub collisions: Vec<QuarantinedFile>,
}

impl PullReport {
    pub fn up_to_date(head: Option<CommitRef>) -> Self {
        Self {
            outcome: PullOutcome::UpToDate,
            incoming_commits: 0,
            head,
            restored: Vec::new(),
            retained: Vec::new(),
            collisions: Vec::new(),
        }
    }

    pub fn collision(&self) -> Option<ConflictInfo> {
        if self.collisions.is_empty() {
            return None;
        }
        Some(ConflictInfo::new(
            ConflictKind::UntrackedCollision,
            self.collisions.iter().map(|q| q.original_path.clone()),
            format!(
                "{} untracked file(s) differ from the pulled version and were quarantined",
                self.collisions.len()
            ),
        ))
    }
}

/// Which changes a commit picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScope {
    /// In-scope modifications and deletions of tracked files.
    Tracked,
    /// Every in-scope change, including new files.
    All,
    /// Everything a checkout would overwrite: every in-scope change plus
    /// tracked modifications outside the watch scope.
    Worktree,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct GitError {
    pub code: GitErrorCode,
    pub message: String,
}

impl GitError {
    pub fn new(code: GitErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        Self::new(GitErrorCode::IoError, format!("{}: {}", context, err))
    }

    pub fn timeout(operation: &str, bound: Duration) -> Self {
        Self::new(
            GitErrorCode::Timeout,
            format!("git {} did not finish within {:?}", operation, bound),
        )
    }

    /// Worth retrying later without user intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self.code, GitErrorCode::Network | GitErrorCode::Timeout)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GitErrorCode {
    NotARepository,
    GitNotInstalled,
    CommandFailed,
    ParseError,
    IoError,
    Network,
    Timeout,
    DirtyWorkingTree,
    NotFound,
}

/// Failure of an operation that can end in a conflict.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    #[error("{0}")]
    Conflict(ConflictInfo),

    #[error(transparent)]
    Git(#[from] GitError),
}
