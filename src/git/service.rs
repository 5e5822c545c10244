use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use super::quarantine::{Quarantine, QuarantinedFile, Reconciliation};
use super::repository::RemoteRepository;
use super::types::*;
use crate::config::SyncSettings;
use crate::file_watcher::PathFilter;

const REMOTE_NAME: &str = "origin";
const STATE_DIR_NAME: &str = "wavesync";
const QUARANTINE_DIR_NAME: &str = "quarantine";
/// Upper bound for git commands that never touch the network.
const LOCAL_OP_TIMEOUT: Duration = Duration::from_secs(120);
const PATHSPEC_CHUNK: usize = 200;

const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "could not read from remote repository",
    "unable to access",
    "failed to connect",
    "connection refused",
    "connection timed out",
    "connection reset",
    "network is unreachable",
    "no route to host",
    "operation timed out",
    "the remote end hung up unexpectedly",
    "authentication failed",
    "permission denied (publickey",
];

/// [`RemoteRepository`] backed by the `git` command line.
pub struct GitRepository {
    root: PathBuf,
    git_dir: PathBuf,
    state_dir: PathBuf,
    branch: String,
    network_timeout: Duration,
    filter: PathFilter,
    quarantine: Quarantine,
}

impl GitRepository {
    /// Opens the working copy at `local.codeDirectory`, cloning
    /// `remote.url` into it first when the directory is missing or empty.
    pub async fn open_or_clone(settings: &SyncSettings) -> Result<Self, GitError> {
        let dir = settings.code_directory.as_path();

        if Self::needs_clone(dir).await? {
            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| GitError::io(format!("create {}", parent.display()), e))?;
            }
            info!("Cloning {} into {}", settings.remote_url, dir.display());
            let target = dir.to_string_lossy().into_owned();
            execute(
                None,
                &["clone", "--quiet", &settings.remote_url, &target],
                settings.network_timeout,
            )
            .await?;
        }

        let root = match Self::is_repository(dir).await? {
            Some(root) if same_directory(Path::new(&root), dir) => PathBuf::from(root),
            _ => {
                return Err(GitError::new(
                    GitErrorCode::NotARepository,
                    format!(
                        "{} is not empty and is not the root of a git repository",
                        dir.display()
                    ),
                ))
            }
        };

        let git_dir = execute_text(Some(&root), &["rev-parse", "--absolute-git-dir"], LOCAL_OP_TIMEOUT)
            .await?
            .trim()
            .to_string();
        let git_dir = PathBuf::from(git_dir);

        let filter = PathFilter::new(&settings.watch_patterns, &settings.exclude_patterns)
            .map_err(|e| GitError::new(GitErrorCode::ParseError, format!("invalid pattern: {}", e)))?;

        let state_dir = settings
            .state_directory
            .clone()
            .unwrap_or_else(|| git_dir.join(STATE_DIR_NAME));

        let repo = Self {
            quarantine: Quarantine::new(state_dir.join(QUARANTINE_DIR_NAME)),
            root,
            git_dir,
            state_dir,
            branch: settings.branch.clone(),
            network_timeout: settings.network_timeout,
            filter,
        };

        repo.ensure_remote(&settings.remote_url).await?;
        repo.ensure_branch().await?;

        info!(
            "Opened repository {} on branch {}",
            repo.root.display(),
            repo.branch
        );
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub async fn is_repository(path: &Path) -> Result<Option<String>, GitError> {
        match execute_text(Some(path), &["rev-parse", "--show-toplevel"], LOCAL_OP_TIMEOUT).await {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if e.code == GitErrorCode::NotARepository => Ok(None),
            Err(e) if e.code == GitErrorCode::IoError && !path.exists() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn needs_clone(dir: &Path) -> Result<bool, GitError> {
        match fs::read_dir(dir).await {
            Ok(mut entries) => Ok(entries
                .next_entry()
                .await
                .map_err(|e| GitError::io(format!("list {}", dir.display()), e))?
                .is_none()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(GitError::io(format!("open {}", dir.display()), e)),
        }
    }

    async fn ensure_remote(&self, url: &str) -> Result<(), GitError> {
        match self.git_text(&["remote", "get-url", REMOTE_NAME]).await {
            Ok(current) if current.trim() == url => Ok(()),
            Ok(current) => {
                warn!(
                    "Remote {} pointed at {}, switching to {}",
                    REMOTE_NAME,
                    current.trim(),
                    url
                );
                self.git(&["remote", "set-url", REMOTE_NAME, url]).await.map(|_| ())
            }
            Err(_) => self.git(&["remote", "add", REMOTE_NAME, url]).await.map(|_| ()),
        }
    }

    async fn ensure_branch(&self) -> Result<(), GitError> {
        let current = spawn_git(
            Some(&self.root),
            &["symbolic-ref", "--quiet", "--short", "HEAD"],
            LOCAL_OP_TIMEOUT,
        )
        .await?;
        if current.status.success() && String::from_utf8_lossy(&current.stdout).trim() == self.branch {
            return Ok(());
        }

        let local_ref = format!("refs/heads/{}", self.branch);
        if self.head().await?.is_none() {
            // unborn HEAD: nothing to check out yet, just point HEAD at the branch
            self.git(&["symbolic-ref", "HEAD", &local_ref]).await?;
        } else if self.rev_parse(&local_ref).await?.is_some() {
            self.git(&["checkout", "--quiet", &self.branch]).await?;
        } else if let Some(upstream) = self.upstream().await? {
            self.git(&["checkout", "--quiet", "-b", &self.branch, upstream.as_str()])
                .await?;
        } else {
            self.git(&["checkout", "--quiet", "-b", &self.branch]).await?;
        }
        debug!("Checked out branch {}", self.branch);
        Ok(())
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        execute(Some(&self.root), args, LOCAL_OP_TIMEOUT).await
    }

    async fn git_text(&self, args: &[&str]) -> Result<String, GitError> {
        let bytes = self.git(args).await?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    async fn git_remote(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        execute(Some(&self.root), args, self.network_timeout).await
    }

    async fn rev_parse(&self, rev: &str) -> Result<Option<CommitRef>, GitError> {
        let output = spawn_git(
            Some(&self.root),
            &["rev-parse", "--verify", "--quiet", rev],
            LOCAL_OP_TIMEOUT,
        )
        .await?;
        if output.status.success() {
            Ok(Some(CommitRef::new(String::from_utf8_lossy(&output.stdout))))
        } else {
            Ok(None)
        }
    }

    async fn upstream(&self) -> Result<Option<CommitRef>, GitError> {
        self.rev_parse(&format!("refs/remotes/{}/{}", REMOTE_NAME, self.branch))
            .await
    }

    async fn fetch(&self) -> Result<(), GitError> {
        self.git_remote(&["fetch", "--quiet", "--prune", REMOTE_NAME])
            .await
            .map(|_| ())
    }

    async fn count_commits(&self, range: &str) -> Result<u32, GitError> {
        let output = self.git_text(&["rev-list", "--count", range]).await?;
        output.trim().parse::<u32>().map_err(|_| {
            GitError::new(
                GitErrorCode::ParseError,
                format!("unexpected rev-list output: {}", output.trim()),
            )
        })
    }

    async fn get_ahead_behind(&self, upstream: &str) -> Result<(u32, u32), GitError> {
        let range = format!("HEAD...{}", upstream);
        let output = self
            .git_text(&["rev-list", "--left-right", "--count", &range])
            .await?;
        Ok(parse_left_right(&output))
    }

    async fn names(&self, args: &[&str]) -> Result<Vec<String>, GitError> {
        let bytes = self.git(args).await?;
        Ok(split_nul(&bytes))
    }

    async fn has_staged_changes(&self) -> Result<bool, GitError> {
        let output = spawn_git(
            Some(&self.root),
            &["diff", "--cached", "--quiet"],
            LOCAL_OP_TIMEOUT,
        )
        .await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(failure(&output)),
        }
    }

    async fn commit_index(&self, message: &str) -> Result<Option<CommitRef>, GitError> {
        if !self.has_staged_changes().await? {
            return Ok(None);
        }
        self.git(&[
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--no-verify",
            "-m",
            message,
        ])
        .await?;
        let head = self.head().await?;
        if let Some(commit) = &head {
            info!("Committed {}: {}", commit.short(), first_line(message));
        }
        Ok(head)
    }

    async fn porcelain(&self) -> Result<ParsedStatus, GitError> {
        let output = self
            .git(&["status", "--porcelain=v1", "--branch", "-z", "--untracked-files=all"])
            .await?;
        parse_status_porcelain_v1_z(&output).ok_or_else(|| {
            GitError::new(GitErrorCode::ParseError, "unreadable git status output")
        })
    }

    /// Working tree description without touching the remote. Everything but
    /// conflicts is limited to paths the watch filter accepts.
    async fn local_state(&self, network_error: Option<String>) -> Result<RepositoryState, GitError> {
        let parsed = self.porcelain().await?;

        let head = self.head().await?;
        let upstream = self.upstream().await?;
        let (ahead, behind) = match (&head, &upstream) {
            (Some(_), Some(up)) => self.get_ahead_behind(up.as_str()).await?,
            (Some(_), None) => (self.count_commits("HEAD").await?, 0),
            (None, Some(up)) => (0, self.count_commits(up.as_str()).await?),
            (None, None) => (0, 0),
        };

        let mut changed: BTreeMap<String, FileChange> = BTreeMap::new();
        for change in parsed
            .staged_files
            .iter()
            .chain(parsed.modified_files.iter())
            .chain(parsed.untracked_files.iter())
        {
            if self.filter.allows_str(&change.path) {
                changed.entry(change.path.clone()).or_insert_with(|| change.clone());
            }
        }

        let is_dirty = !changed.is_empty() || !parsed.conflicted_files.is_empty();

        let changed_files: Vec<FileChange> = changed.into_values().collect();
        Ok(RepositoryState {
            has_remote_changes: behind > 0,
            has_local_changes: !changed_files.is_empty() || ahead > 0,
            current_branch: parsed.current_branch,
            ahead,
            behind,
            is_dirty,
            last_conflict: None,
            changed_files,
            untracked_files: parsed.untracked_files.into_iter().map(|f| f.path).collect(),
            conflicted_files: parsed.conflicted_files.into_iter().map(|f| f.path).collect(),
            network_error,
        })
    }

    /// Paths `read-tree --reset` would overwrite: every tracked change and
    /// conflict regardless of the watch filter, plus in-scope untracked files.
    async fn checkout_blockers(&self) -> Result<BTreeSet<String>, GitError> {
        let parsed = self.porcelain().await?;
        let untracked = parsed
            .untracked_files
            .into_iter()
            .filter(|f| self.filter.allows_str(&f.path));
        Ok(parsed
            .staged_files
            .into_iter()
            .chain(parsed.modified_files)
            .chain(parsed.conflicted_files)
            .chain(untracked)
            .map(|f| f.path)
            .collect())
    }

    async fn stash_collisions(&self, paths: &[String]) -> Result<Vec<QuarantinedFile>, GitError> {
        let mut stashed = Vec::with_capacity(paths.len());
        for path in paths {
            match self.quarantine.stash(&self.root, path).await {
                Ok(entry) => stashed.push(entry),
                Err(e) => {
                    self.restore_all(&stashed).await;
                    return Err(e);
                }
            }
        }
        Ok(stashed)
    }

    async fn restore_all(&self, entries: &[QuarantinedFile]) {
        for entry in entries {
            if let Err(e) = self.quarantine.restore(&self.root, &entry.id).await {
                warn!(
                    "Failed to restore quarantined {} ({}): {}",
                    entry.original_path, entry.id, e
                );
            }
        }
    }

    async fn merge(&self, upstream: &CommitRef) -> Result<PullOutcome, GitError> {
        if self
            .git(&["merge", "--ff-only", "--quiet", upstream.as_str()])
            .await
            .is_ok()
        {
            return Ok(PullOutcome::FastForwarded);
        }
        self.git(&[
            "-c",
            "commit.gpgsign=false",
            "merge",
            "--no-edit",
            "--no-verify",
            upstream.as_str(),
        ])
        .await?;
        Ok(PullOutcome::Merged)
    }
}

#[async_trait]
impl RemoteRepository for GitRepository {
    fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    async fn status(&self) -> Result<RepositoryState, GitError> {
        let network_error = match self.fetch().await {
            Ok(()) => None,
            Err(e) if e.is_transient() => {
                warn!("Fetch from {} failed: {}", REMOTE_NAME, e);
                Some(e.message)
            }
            Err(e) => return Err(e),
        };
        self.local_state(network_error).await
    }

    async fn pull(&self) -> Result<PullReport, RepoError> {
        self.fetch().await?;

        let head = self.head().await?;
        let Some(upstream) = self.upstream().await? else {
            return Ok(PullReport::up_to_date(head));
        };
        let incoming = match &head {
            Some(_) => self.count_commits(&format!("HEAD..{}", upstream)).await?,
            None => self.count_commits(upstream.as_str()).await?,
        };
        if incoming == 0 {
            return Ok(PullReport::up_to_date(head));
        }

        let local = self.local_state(None).await?;
        let incoming_paths: HashSet<String> = self
            .names(&["ls-tree", "-r", "--name-only", "-z", upstream.as_str()])
            .await?
            .into_iter()
            .collect();
        let colliding: Vec<String> = local
            .untracked_files
            .iter()
            .filter(|path| incoming_paths.contains(*path))
            .cloned()
            .collect();
        let stashed = self.stash_collisions(&colliding).await?;

        let outcome = match self.merge(&upstream).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut paths = self
                    .names(&["diff", "--name-only", "--diff-filter=U", "-z"])
                    .await
                    .unwrap_or_default();
                if paths.is_empty() {
                    paths = paths_from_merge_message(&e.message);
                }
                // fails harmlessly when the merge never started
                let _ = self.git(&["merge", "--abort"]).await;
                self.restore_all(&stashed).await;

                if e.is_transient() {
                    return Err(e.into());
                }
                warn!("Merge of {} stopped on conflicts: {:?}", upstream.short(), paths);
                return Err(RepoError::Conflict(ConflictInfo::new(
                    ConflictKind::MergeConflict,
                    paths,
                    e.message,
                )));
            }
        };

        let mut report = PullReport {
            outcome,
            incoming_commits: incoming,
            head: self.head().await?,
            restored: Vec::new(),
            retained: Vec::new(),
            collisions: Vec::new(),
        };
        for entry in stashed {
            match self.quarantine.reconcile(&self.root, &entry).await? {
                Reconciliation::Identical => {}
                Reconciliation::Extended => report.retained.push(entry),
                Reconciliation::Restored => report.restored.push(entry.original_path),
                Reconciliation::Diverged => report.collisions.push(entry),
            }
        }

        info!(
            "Pulled {} commit(s) from {}/{} ({:?})",
            incoming, REMOTE_NAME, self.branch, report.outcome
        );
        Ok(report)
    }

    async fn commit(&self, message: &str, scope: StageScope) -> Result<Option<CommitRef>, GitError> {
        let parsed = self.porcelain().await?;
        let in_scope = |change: &&FileChange| self.filter.allows_str(&change.path);

        // index-side changes are committed as they are; only worktree-side
        // changes need staging
        let worktree = parsed.modified_files.iter();
        let untracked = parsed.untracked_files.iter().filter(in_scope);
        let paths: BTreeSet<&str> = match scope {
            StageScope::Tracked => worktree.filter(in_scope).map(|c| c.path.as_str()).collect(),
            StageScope::All => worktree
                .filter(in_scope)
                .chain(untracked)
                .map(|c| c.path.as_str())
                .collect(),
            StageScope::Worktree => worktree.chain(untracked).map(|c| c.path.as_str()).collect(),
        };
        let paths: Vec<&str> = paths.into_iter().collect();
        for chunk in paths.chunks(PATHSPEC_CHUNK) {
            let mut args = vec!["--literal-pathspecs", "add", "-A", "--"];
            args.extend_from_slice(chunk);
            self.git(&args).await?;
        }
        self.commit_index(message).await
    }

    async fn push(&self) -> Result<(), RepoError> {
        let Some(head) = self.head().await? else {
            return Ok(());
        };
        if self.upstream().await?.as_ref() == Some(&head) {
            return Ok(());
        }

        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        match self.git_remote(&["push", "--quiet", REMOTE_NAME, &refspec]).await {
            Ok(_) => {
                info!("Pushed {} to {}/{}", head.short(), REMOTE_NAME, self.branch);
                Ok(())
            }
            Err(e) if is_push_rejection(&e.message) => {
                let paths = match self.upstream().await? {
                    Some(up) => self
                        .names(&["diff", "--name-only", "-z", &format!("{}...HEAD", up)])
                        .await
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                warn!("Push rejected, remote has diverged");
                Err(RepoError::Conflict(ConflictInfo::new(
                    ConflictKind::MergeConflict,
                    paths,
                    e.message,
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn checkout_commit(
        &self,
        target: &CommitRef,
        message: &str,
    ) -> Result<Option<CommitRef>, GitError> {
        let blocking = self.checkout_blockers().await?;
        if !blocking.is_empty() {
            let paths: Vec<&str> = blocking.iter().map(String::as_str).collect();
            return Err(GitError::new(
                GitErrorCode::DirtyWorkingTree,
                format!("working tree has uncommitted changes: {}", paths.join(", ")),
            ));
        }
        if self.rev_parse(&format!("{}^{{commit}}", target)).await?.is_none() {
            return Err(GitError::new(
                GitErrorCode::NotFound,
                format!("commit {} does not exist", target),
            ));
        }

        self.git(&["read-tree", "-u", "--reset", target.as_str()]).await?;
        let result = self.commit_index(message).await?;
        if result.is_none() {
            debug!("Working tree already matches {}", target.short());
        }
        Ok(result)
    }

    async fn head(&self) -> Result<Option<CommitRef>, GitError> {
        self.rev_parse("HEAD").await
    }

    async fn commit_summary(&self, commit: &CommitRef) -> Result<String, GitError> {
        let text = self
            .git_text(&["log", "-1", "--format=%s", commit.as_str()])
            .await?;
        Ok(text.trim().to_string())
    }

    async fn quarantined(&self) -> Result<Vec<QuarantinedFile>, GitError> {
        self.quarantine.list().await
    }

    async fn restore_quarantined(&self, id: &str) -> Result<String, GitError> {
        self.quarantine.restore(&self.root, id).await
    }

    async fn discard_quarantined(&self, id: &str) -> Result<QuarantinedFile, GitError> {
        self.quarantine.discard(id).await
    }
}

/// First non-option argument, skipping `-c key=value` pairs.
fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "-c" {
            iter.next();
        } else if !arg.starts_with('-') {
            return arg;
        }
    }
    "git"
}

async fn spawn_git(cwd: Option<&Path>, args: &[&str], bound: Duration) -> Result<Output, GitError> {
    let mut cmd = AsyncCommand::new("git");
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if std::env::var_os("GIT_SSH_COMMAND").is_none() {
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
    }
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let operation = subcommand(args);
    debug!("git {}", args.join(" "));
    match tokio::time::timeout(bound, cmd.output()).await {
        Err(_) => Err(GitError::timeout(operation, bound)),
        Ok(Err(e)) => Err(match e.kind() {
            io::ErrorKind::NotFound if cwd.map_or(true, Path::exists) => {
                GitError::new(GitErrorCode::GitNotInstalled, "git is not installed")
            }
            _ => GitError::io(format!("git {}", operation), e),
        }),
        Ok(Ok(output)) => Ok(output),
    }
}

async fn execute(cwd: Option<&Path>, args: &[&str], bound: Duration) -> Result<Vec<u8>, GitError> {
    let output = spawn_git(cwd, args, bound).await?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(failure(&output))
    }
}

async fn execute_text(cwd: Option<&Path>, args: &[&str], bound: Duration) -> Result<String, GitError> {
    let bytes = execute(cwd, args, bound).await?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

fn failure(output: &Output) -> GitError {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = match (stdout.is_empty(), stderr.is_empty()) {
        (false, false) => format!("{}\n{}", stdout, stderr),
        (true, false) => stderr,
        (false, true) => stdout,
        (true, true) => format!("git exited with {}", output.status),
    };
    GitError::new(classify_failure(&message), message)
}

fn classify_failure(message: &str) -> GitErrorCode {
    let msg = message.to_lowercase();
    if NETWORK_MARKERS.iter().any(|marker| msg.contains(marker)) {
        GitErrorCode::Network
    } else if is_not_a_repository(&msg) {
        GitErrorCode::NotARepository
    } else {
        GitErrorCode::CommandFailed
    }
}

fn is_not_a_repository(msg: &str) -> bool {
    msg.contains("not a git repository") || msg.contains("fatal: not a repository")
}

fn is_push_rejection(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("[rejected]") || msg.contains("non-fast-forward") || msg.contains("fetch first")
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).to_string())
        .collect()
}

fn parse_left_right(output: &str) -> (u32, u32) {
    let mut parts = output.split_whitespace();
    let ahead: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let behind: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    (ahead, behind)
}

/// Paths named by a failed merge: the tab-indented list git prints for
/// files that would be overwritten, and `CONFLICT` lines.
fn paths_from_merge_message(message: &str) -> Vec<String> {
    let mut paths = BTreeSet::new();
    for line in message.lines() {
        if let Some(path) = line.strip_prefix('\t') {
            let path = path.trim();
            if !path.is_empty() {
                paths.insert(path.to_string());
            }
        } else if line.starts_with("CONFLICT") {
            if let Some((_, path)) = line.rsplit_once(" in ") {
                paths.insert(path.trim().to_string());
            }
        }
    }
    paths.into_iter().collect()
}

#[derive(Default)]
struct ParsedStatus {
    current_branch: Option<String>,
    staged_files: Vec<FileChange>,
    modified_files: Vec<FileChange>,
    untracked_files: Vec<FileChange>,
    conflicted_files: Vec<FileChange>,
    ahead: Option<u32>,
    behind: Option<u32>,
    is_empty: bool,
    is_detached: bool,
}

fn parse_status_porcelain_v1_z(bytes: &[u8]) -> Option<ParsedStatus> {
    let entries: Vec<&[u8]> = bytes.split(|b| *b == 0).filter(|s| !s.is_empty()).collect();
    let mut parsed = ParsedStatus::default();

    // branch info is usually the first record, but don't rely on it.
    let mut i = 0;
    while i < entries.len() {
        let entry = entries[i];
        if entry.starts_with(b"## ") {
            let line = String::from_utf8_lossy(&entry[3..]).trim().to_string();
            parse_branch_summary(&line, &mut parsed);
            i += 1;
            continue;
        }

        if entry.len() < 4 {
            i += 1;
            continue;
        }

        let x = entry[0] as char;
        let y = entry[1] as char;
        let path = String::from_utf8_lossy(&entry[3..]).to_string();

        if x == '?' && y == '?' {
            parsed.untracked_files.push(FileChange {
                path,
                status: FileChangeStatus::Untracked,
                old_path: None,
            });
            i += 1;
            continue;
        }

        let is_unmerged = matches!(
            (x, y),
            ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
        );
        if is_unmerged {
            parsed.conflicted_files.push(FileChange {
                path,
                status: FileChangeStatus::Conflicted,
                old_path: None,
            });
            i += 1;
            continue;
        }

        // With -z a rename record is followed by the source path.
        let mut old_path: Option<String> = None;
        if matches!(x, 'R' | 'C') || matches!(y, 'R' | 'C') {
            if let Some(source) = entries.get(i + 1) {
                old_path = Some(String::from_utf8_lossy(source).to_string());
                i += 1;
            }
        }

        if x != ' ' {
            if let Some(status) = map_status_char(x, true) {
                parsed.staged_files.push(FileChange {
                    path: path.clone(),
                    status,
                    old_path: old_path.clone(),
                });
            }
        }

        if y != ' ' {
            if let Some(status) = map_status_char(y, false) {
                parsed.modified_files.push(FileChange {
                    path,
                    status,
                    old_path,
                });
            }
        }

        i += 1;
    }

    Some(parsed)
}

fn map_status_char(ch: char, is_index: bool) -> Option<FileChangeStatus> {
    match ch {
        'A' => Some(FileChangeStatus::Added),
        'M' => Some(FileChangeStatus::Modified),
        'D' => Some(FileChangeStatus::Deleted),
        'R' => Some(FileChangeStatus::Renamed),
        'C' => Some(FileChangeStatus::Copied),
        '?' => Some(FileChangeStatus::Untracked),
        '!' | ' ' => None,
        // unknown worktree codes still mean the file changed
        _ if !is_index => Some(FileChangeStatus::Modified),
        _ => None,
    }
}

fn parse_branch_summary(summary: &str, parsed: &mut ParsedStatus) {
    let summary = summary.trim();
    if summary.is_empty() {
        return;
    }

    if summary == "HEAD (no branch)" {
        parsed.is_detached = true;
        parsed.current_branch = None;
        return;
    }

    if let Some(rest) = summary
        .strip_prefix("No commits yet on ")
        .or_else(|| summary.strip_prefix("Initial commit on "))
    {
        parsed.is_empty = true;
        parsed.current_branch = Some(rest.trim().to_string());
        return;
    }

    // <branch>...<upstream> [ahead N, behind M]
    let (head_part, bracket_part) = match summary.split_once(" [") {
        Some((left, right)) => (left.trim(), Some(right.trim_end_matches(']').trim())),
        None => (summary, None),
    };

    let branch = head_part
        .split_once("...")
        .map_or(head_part, |(b, _)| b)
        .trim();
    parsed.current_branch = (!branch.is_empty()).then(|| branch.to_string());

    if let Some(bracket) = bracket_part {
        for part in bracket.split(',') {
            let p = part.trim();
            if let Some(num) = p.strip_prefix("ahead ") {
                parsed.ahead = num.trim().parse::<u32>().ok();
            } else if let Some(num) = p.strip_prefix("behind ") {
                parsed.behind = num.trim().parse::<u32>().ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_branch_summary_detached() {
        let mut parsed = ParsedStatus::default();
        parse_branch_summary("HEAD (no branch)", &mut parsed);
        assert!(parsed.is_detached);
        assert!(parsed.current_branch.is_none());
    }

    #[test]
    fn parse_branch_summary_ahead_behind() {
        let mut parsed = ParsedStatus::default();
        parse_branch_summary("main...origin/main [ahead 3, behind 1]", &mut parsed);
        assert_eq!(parsed.current_branch.as_deref(), Some("main"));
        assert_eq!(parsed.ahead, Some(3));
        assert_eq!(parsed.behind, Some(1));
    }

    #[test]
    fn parse_branch_summary_unborn() {
        let mut parsed = ParsedStatus::default();
        parse_branch_summary("No commits yet on main", &mut parsed);
        assert!(parsed.is_empty);
        assert_eq!(parsed.current_branch.as_deref(), Some("main"));
    }

    #[test]
    fn parse_status_porcelain_v1_z_basic() {
        let raw = b"## main...origin/main [ahead 1]\0 M file.txt\0?? new dir/new.txt\0UU both.txt\0";
        let parsed = parse_status_porcelain_v1_z(raw).unwrap();
        assert_eq!(parsed.current_branch.as_deref(), Some("main"));
        assert_eq!(parsed.ahead, Some(1));
        assert_eq!(parsed.modified_files.len(), 1);
        assert_eq!(parsed.modified_files[0].path, "file.txt");
        assert_eq!(parsed.untracked_files[0].path, "new dir/new.txt");
        assert_eq!(parsed.conflicted_files[0].path, "both.txt");
    }

    #[test]
    fn parse_status_rename_records_source() {
        let raw = b"R  new.txt\0old.txt\0 M other.txt\0";
        let parsed = parse_status_porcelain_v1_z(raw).unwrap();
        assert_eq!(parsed.staged_files.len(), 1);
        assert_eq!(parsed.staged_files[0].path, "new.txt");
        assert_eq!(parsed.staged_files[0].old_path.as_deref(), Some("old.txt"));
        assert_eq!(parsed.modified_files[0].path, "other.txt");
    }

    #[test]
    fn failures_are_classified() {
        assert_eq!(
            classify_failure("fatal: unable to access 'https://example.invalid/': Could not resolve host"),
            GitErrorCode::Network
        );
        assert_eq!(
            classify_failure("fatal: '/tmp/missing' does not appear to be a git repository\nfatal: Could not read from remote repository."),
            GitErrorCode::Network
        );
        assert_eq!(
            classify_failure("fatal: not a git repository (or any of the parent directories): .git"),
            GitErrorCode::NotARepository
        );
        assert_eq!(classify_failure("error: pathspec 'x' did not match"), GitErrorCode::CommandFailed);
    }

    #[test]
    fn push_rejection_detection() {
        assert!(is_push_rejection(
            " ! [rejected]        HEAD -> main (fetch first)\nerror: failed to push some refs"
        ));
        assert!(!is_push_rejection(" ! [remote rejected] HEAD -> main (pre-receive hook declined)"));
    }

    #[test]
    fn merge_message_paths() {
        let message = "error: Your local changes to the following files would be overwritten by merge:\n\tsrc/a.rs\n\tb.txt\nPlease commit your changes or stash them before you merge.\nAborting\nCONFLICT (content): Merge conflict in c.md";
        assert_eq!(
            paths_from_merge_message(message),
            vec!["b.txt".to_string(), "c.md".to_string(), "src/a.rs".to_string()]
        );
    }

    #[test]
    fn subcommand_skips_config_overrides() {
        assert_eq!(subcommand(&["-c", "commit.gpgsign=false", "commit", "-m", "x"]), "commit");
        assert_eq!(subcommand(&["--literal-pathspecs", "add", "-A"]), "add");
    }

    #[test]
    fn left_right_counts() {
        assert_eq!(parse_left_right("3\t1\n"), (3, 1));
        assert_eq!(parse_left_right(""), (0, 0));
    }
}
