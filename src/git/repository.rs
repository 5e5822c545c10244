use std::path::PathBuf;

use async_trait::async_trait;

use super::quarantine::QuarantinedFile;
use super::types::{CommitRef, GitError, PullReport, RepoError, RepositoryState, StageScope};

/// The operations the sync engine needs from a repository with a remote.
///
/// Every method is individually retryable: repeating a pull or push that
/// already succeeded is a no-op. Network failures come back as
/// [`GitErrorCode::Network`](super::GitErrorCode::Network) or
/// [`GitErrorCode::Timeout`](super::GitErrorCode::Timeout) and are retried by
/// the caller, never inside the implementation.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Directory where engine state for this repository is kept by default.
    fn state_dir(&self) -> PathBuf;

    /// Refreshes remote refs and describes the working tree. An unreachable
    /// remote is reported through [`RepositoryState::network_error`].
    async fn status(&self) -> Result<RepositoryState, GitError>;

    async fn pull(&self) -> Result<PullReport, RepoError>;

    /// `Ok(None)` when there was nothing to commit.
    async fn commit(&self, message: &str, scope: StageScope) -> Result<Option<CommitRef>, GitError>;

    /// Never forces; a rejected push is a conflict.
    async fn push(&self) -> Result<(), RepoError>;

    /// Makes the working tree content-identical to `target` and records that
    /// as a new commit on the current branch. Refuses with
    /// `DirtyWorkingTree`, naming the paths, while anything it would overwrite
    /// is uncommitted; [`StageScope::Worktree`] commits exactly that.
    async fn checkout_commit(
        &self,
        target: &CommitRef,
        message: &str,
    ) -> Result<Option<CommitRef>, GitError>;

    async fn head(&self) -> Result<Option<CommitRef>, GitError>;

    /// Subject line of `commit`.
    async fn commit_summary(&self, commit: &CommitRef) -> Result<String, GitError>;

    async fn quarantined(&self) -> Result<Vec<QuarantinedFile>, GitError>;

    /// Returns the path the file was restored to.
    async fn restore_quarantined(&self, id: &str) -> Result<String, GitError>;

    async fn discard_quarantined(&self, id: &str) -> Result<QuarantinedFile, GitError>;
}
