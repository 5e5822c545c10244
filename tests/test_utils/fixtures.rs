/*!
 * 测试固定数据和辅助类型
 *
 * `FakeRepository` models a linear history where every commit names the
 * tree it records. The working tree is a single label; it is dirty while it
 * differs from the tree at HEAD.
 */

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use wavesync::config::SyncSettings;
use wavesync::git::{
    CommitRef, FileChange, FileChangeStatus, GitError, GitErrorCode, PullOutcome, PullReport,
    QuarantinedFile, RemoteRepository, RepoError, RepositoryState, StageScope,
};

pub const BASE_TREE: &str = "base";

#[derive(Default)]
struct FakeState {
    history: Vec<CommitRef>,
    trees: HashMap<CommitRef, String>,
    summaries: HashMap<CommitRef, String>,
    worktree: String,
    ahead: u32,
    /// Trees of commits waiting on the remote.
    incoming: VecDeque<String>,
    network_down: bool,
    hang_pull: bool,
    pull_script: VecDeque<Result<PullReport, RepoError>>,
    push_script: VecDeque<Result<(), RepoError>>,
    checkouts: Vec<CommitRef>,
    pulls: u32,
    pushes: u32,
}

impl FakeState {
    fn head(&self) -> Option<CommitRef> {
        self.history.last().cloned()
    }

    fn head_tree(&self) -> String {
        self.head()
            .and_then(|h| self.trees.get(&h).cloned())
            .unwrap_or_default()
    }

    fn record(&mut self, tree: String, summary: &str) -> CommitRef {
        let commit = CommitRef::new(format!("{:040x}", self.history.len() + 1));
        self.trees.insert(commit.clone(), tree);
        self.summaries.insert(commit.clone(), summary.to_string());
        self.history.push(commit.clone());
        commit
    }
}

pub struct FakeRepository {
    state_dir: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeRepository {
    /// One initial commit holding [`BASE_TREE`].
    pub fn new(state_dir: &Path) -> Self {
        let mut state = FakeState::default();
        state.record(BASE_TREE.to_string(), "initial commit");
        state.worktree = BASE_TREE.to_string();
        Self {
            state_dir: state_dir.to_path_buf(),
            state: Mutex::new(state),
        }
    }

    /// Simulates a local edit.
    pub fn edit(&self, tree: &str) {
        self.state.lock().worktree = tree.to_string();
    }

    pub fn worktree(&self) -> String {
        self.state.lock().worktree.clone()
    }

    pub fn head_tree(&self) -> String {
        self.state.lock().head_tree()
    }

    /// Queues a commit on the remote.
    pub fn remote_commit(&self, tree: &str) {
        self.state.lock().incoming.push_back(tree.to_string());
    }

    pub fn set_network_down(&self, down: bool) {
        self.state.lock().network_down = down;
    }

    pub fn hang_pulls(&self) {
        self.state.lock().hang_pull = true;
    }

    pub fn script_pull(&self, result: Result<PullReport, RepoError>) {
        self.state.lock().pull_script.push_back(result);
    }

    pub fn script_push(&self, result: Result<(), RepoError>) {
        self.state.lock().push_script.push_back(result);
    }

    pub fn pulls(&self) -> u32 {
        self.state.lock().pulls
    }

    pub fn pushes(&self) -> u32 {
        self.state.lock().pushes
    }

    pub fn ahead(&self) -> u32 {
        self.state.lock().ahead
    }

    pub fn checkouts(&self) -> Vec<CommitRef> {
        self.state.lock().checkouts.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().history.len()
    }
}

#[async_trait]
impl RemoteRepository for FakeRepository {
    fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    async fn status(&self) -> Result<RepositoryState, GitError> {
        let state = self.state.lock();
        let dirty = state.worktree != state.head_tree();
        let changed_files = if dirty {
            vec![FileChange {
                path: "notes/todo.txt".to_string(),
                status: FileChangeStatus::Modified,
                old_path: None,
            }]
        } else {
            Vec::new()
        };

        Ok(RepositoryState {
            has_remote_changes: !state.incoming.is_empty() && !state.network_down,
            has_local_changes: dirty || state.ahead > 0,
            current_branch: Some("main".to_string()),
            ahead: state.ahead,
            behind: state.incoming.len() as u32,
            is_dirty: dirty,
            changed_files,
            network_error: state
                .network_down
                .then(|| "Could not resolve host: example.invalid".to_string()),
            ..RepositoryState::default()
        })
    }

    async fn pull(&self) -> Result<PullReport, RepoError> {
        let hang = self.state.lock().hang_pull;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        state.pulls += 1;
        if let Some(scripted) = state.pull_script.pop_front() {
            return scripted;
        }
        if state.network_down {
            return Err(GitError::new(GitErrorCode::Network, "Could not resolve host").into());
        }
        if state.incoming.is_empty() {
            return Ok(PullReport::up_to_date(state.head()));
        }

        let incoming = state.incoming.len() as u32;
        while let Some(tree) = state.incoming.pop_front() {
            state.record(tree, "remote change");
        }
        state.worktree = state.head_tree();
        Ok(PullReport {
            outcome: PullOutcome::FastForwarded,
            incoming_commits: incoming,
            ..PullReport::up_to_date(state.head())
        })
    }

    async fn commit(&self, message: &str, _scope: StageScope) -> Result<Option<CommitRef>, GitError> {
        let mut state = self.state.lock();
        if state.worktree == state.head_tree() {
            return Ok(None);
        }
        let tree = state.worktree.clone();
        let commit = state.record(tree, message);
        state.ahead += 1;
        Ok(Some(commit))
    }

    async fn push(&self) -> Result<(), RepoError> {
        let mut state = self.state.lock();
        if let Some(scripted) = state.push_script.pop_front() {
            return scripted;
        }
        if state.network_down {
            return Err(GitError::new(GitErrorCode::Network, "Could not resolve host").into());
        }
        state.pushes += 1;
        state.ahead = 0;
        Ok(())
    }

    async fn checkout_commit(
        &self,
        target: &CommitRef,
        message: &str,
    ) -> Result<Option<CommitRef>, GitError> {
        let mut state = self.state.lock();
        if state.worktree != state.head_tree() {
            return Err(GitError::new(
                GitErrorCode::DirtyWorkingTree,
                "working tree has uncommitted changes",
            ));
        }
        let tree = state
            .trees
            .get(target)
            .cloned()
            .ok_or_else(|| GitError::new(GitErrorCode::NotFound, format!("unknown commit {}", target)))?;
        state.checkouts.push(target.clone());
        state.worktree = tree.clone();
        if tree == state.head_tree() {
            return Ok(None);
        }
        let commit = state.record(tree, message);
        state.ahead += 1;
        Ok(Some(commit))
    }

    async fn head(&self) -> Result<Option<CommitRef>, GitError> {
        Ok(self.state.lock().head())
    }

    async fn commit_summary(&self, commit: &CommitRef) -> Result<String, GitError> {
        self.state
            .lock()
            .summaries
            .get(commit)
            .cloned()
            .ok_or_else(|| GitError::new(GitErrorCode::NotFound, format!("unknown commit {}", commit)))
    }

    async fn quarantined(&self) -> Result<Vec<QuarantinedFile>, GitError> {
        Ok(Vec::new())
    }

    async fn restore_quarantined(&self, id: &str) -> Result<String, GitError> {
        Err(GitError::new(GitErrorCode::NotFound, format!("no quarantined file {}", id)))
    }

    async fn discard_quarantined(&self, id: &str) -> Result<QuarantinedFile, GitError> {
        Err(GitError::new(GitErrorCode::NotFound, format!("no quarantined file {}", id)))
    }
}

/// Settings for an engine over a fake repository: fast ticks, short
/// debounce, state kept under `dir`.
pub fn fast_settings(dir: &Path) -> SyncSettings {
    let code = dir.join("code");
    std::fs::create_dir_all(&code).unwrap();

    let mut settings = SyncSettings::new("https://example.invalid/repo.git", code);
    settings.sync_interval = Duration::from_millis(100);
    settings.debounce = Duration::from_millis(50);
    settings.stop_timeout = Duration::from_secs(1);
    settings.state_directory = Some(dir.join("state"));
    settings
}

/// Same, but nothing happens on the timer: navigation tests drive every
/// change themselves.
pub fn quiet_settings(dir: &Path) -> SyncSettings {
    let mut settings = fast_settings(dir);
    settings.auto_pull = false;
    settings.auto_push = false;
    settings.sync_interval = Duration::from_secs(3600);
    settings
}
