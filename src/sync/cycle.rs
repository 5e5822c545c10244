/*!
 * 单次同步周期
 *
 * One pass of the sync loop: status, then pull, then commit and push. The
 * shutdown token is checked before every phase; the caller holds the
 * execution guard for the whole pass.
 */

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use crate::checkpoint::{Checkpoint, CheckpointStore, CheckpointTrigger};
use crate::config::SyncSettings;
use crate::file_watcher::FileMonitor;
use crate::git::{
    CommitRef, ConflictInfo, ConflictKind, FileChangeStatus, PullOutcome, PullReport,
    RemoteRepository, RepositoryState, StageScope,
};

const LISTED_FILES: usize = 5;
const MAX_BACKOFF_FACTOR: u32 = 8;
const MAX_BACKOFF_SHIFT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleMode {
    /// Timer-driven; phases obey `autoPull`/`autoPush`.
    Scheduled,
    /// Requested by the caller; both phases run regardless of settings.
    Manual,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullReport>,
    pub commits: Vec<CommitRef>,
    pub pushed: bool,
    /// Shutdown was requested before all phases ran.
    pub cancelled: bool,
}

impl CycleReport {
    /// Report of a cycle that was dropped before finishing.
    pub fn interrupted() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn pulled(&self) -> bool {
        self.pull
            .as_ref()
            .is_some_and(|p| p.outcome != PullOutcome::UpToDate)
    }
}

/// Borrowed view of the engine components a cycle works with.
pub(crate) struct Cycle<'a> {
    pub repo: &'a dyn RemoteRepository,
    pub store: &'a CheckpointStore,
    pub monitor: &'a FileMonitor,
    pub settings: &'a SyncSettings,
    pub token: &'a CancellationToken,
}

impl Cycle<'_> {
    pub async fn run(&self, mode: CycleMode) -> SyncResult<CycleReport> {
        let mut report = CycleReport::default();

        if self.cancelled(&mut report) {
            return Ok(report);
        }
        let state = self.repo.status().await?;
        if !state.conflicted_files.is_empty() {
            return Err(SyncError::Conflict(ConflictInfo::new(
                ConflictKind::MergeConflict,
                state.conflicted_files.iter().cloned(),
                "the working tree has unresolved merge conflicts",
            )));
        }

        let push_enabled = self.settings.auto_push || mode == CycleMode::Manual;
        let pull_enabled = self.settings.auto_pull || mode == CycleMode::Manual;

        if let Some(message) = &state.network_error {
            // Local work is still committed; the remote phases wait for the
            // next attempt.
            if push_enabled && !self.cancelled(&mut report) {
                self.commit_changes(&state, mode, &mut report).await?;
            }
            return Err(SyncError::Network(message.clone()));
        }

        if pull_enabled && state.has_remote_changes {
            if self.cancelled(&mut report) {
                return Ok(report);
            }
            self.pull(&state, &mut report).await?;
        }

        if push_enabled {
            if self.cancelled(&mut report) {
                return Ok(report);
            }
            self.commit_changes(&state, mode, &mut report).await?;

            let merged = report
                .pull
                .as_ref()
                .is_some_and(|p| p.outcome == PullOutcome::Merged);
            if !report.commits.is_empty() || state.ahead > 0 || merged {
                if self.cancelled(&mut report) {
                    return Ok(report);
                }
                self.repo.push().await.map_err(|e| {
                    SyncError::from_repo(e, "push", self.settings.network_timeout)
                })?;
                report.pushed = true;
                info!("Pushed to {}", self.settings.branch);
            }
        }

        Ok(report)
    }

    fn cancelled(&self, report: &mut CycleReport) -> bool {
        if self.token.is_cancelled() {
            debug!("Sync cycle interrupted by shutdown");
            report.cancelled = true;
        }
        report.cancelled
    }

    async fn pull(&self, state: &RepositoryState, report: &mut CycleReport) -> SyncResult<()> {
        info!("{} new commit(s) on the remote", state.behind);

        // Merges refuse to run over uncommitted tracked edits.
        let tracked: Vec<String> = state
            .changed_files
            .iter()
            .filter(|c| c.status != FileChangeStatus::Untracked)
            .map(|c| c.path.clone())
            .collect();
        if !tracked.is_empty() {
            let message = auto_commit_message(&self.settings.commit_prefix, Local::now(), &tracked);
            if let Some(commit) = self.repo.commit(&message, StageScope::Tracked).await? {
                self.record(&commit, format!("Before pull: {} file(s)", tracked.len()))
                    .await?;
                report.commits.push(commit);
            }
        }

        let result = {
            let _paused = PausedMonitor::new(self.monitor);
            self.repo.pull().await
        };
        let pulled = result.map_err(|e| SyncError::from_repo(e, "pull", self.settings.network_timeout))?;

        info!(
            "Pull finished ({:?}, {} incoming commit(s))",
            pulled.outcome, pulled.incoming_commits
        );
        if !pulled.retained.is_empty() {
            info!(
                "{} untracked file(s) kept in quarantine after pull",
                pulled.retained.len()
            );
        }
        if pulled.outcome != PullOutcome::UpToDate {
            if let Some(head) = &pulled.head {
                self.record(head, format!("Auto-pull: {} commit(s)", pulled.incoming_commits))
                    .await?;
            }
        }

        let collision = pulled.collision();
        report.pull = Some(pulled);
        match collision {
            Some(conflict) => Err(SyncError::Conflict(conflict)),
            None => Ok(()),
        }
    }

    async fn commit_changes(
        &self,
        state: &RepositoryState,
        mode: CycleMode,
        report: &mut CycleReport,
    ) -> SyncResult<()> {
        let batch = self.monitor.take_batch();
        let settled = !self.monitor.has_pending();
        let wanted = batch.is_some() || mode == CycleMode::Manual || (state.is_dirty && settled);
        if !wanted {
            return Ok(());
        }

        let names: Vec<String> = match &batch {
            Some(batch) => batch
                .paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            None => state.changed_files.iter().map(|c| c.path.clone()).collect(),
        };
        let message = auto_commit_message(&self.settings.commit_prefix, Local::now(), &names);

        match self.repo.commit(&message, StageScope::All).await? {
            Some(commit) => {
                info!("Committed local changes as {}", commit.short());
                self.record(&commit, format!("Auto-push: {} file(s)", names.len()))
                    .await?;
                report.commits.push(commit);
            }
            None => debug!("Nothing to commit"),
        }
        Ok(())
    }

    async fn record(&self, commit: &CommitRef, description: String) -> SyncResult<()> {
        record_checkpoint(self.repo, self.store, commit, description, CheckpointTrigger::Auto)
            .await?;
        Ok(())
    }
}

/// Appends a checkpoint for a commit that already exists.
pub(crate) async fn record_checkpoint(
    repo: &dyn RemoteRepository,
    store: &CheckpointStore,
    commit: &CommitRef,
    description: String,
    trigger: CheckpointTrigger,
) -> SyncResult<Checkpoint> {
    let summary = match repo.commit_summary(commit).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Could not read summary of {}: {}", commit.short(), e);
            String::new()
        }
    };
    Ok(store.append(commit.clone(), description, trigger, summary).await?)
}

/// Pauses the monitor for as long as it is held.
pub(crate) struct PausedMonitor<'a>(&'a FileMonitor);

impl<'a> PausedMonitor<'a> {
    pub fn new(monitor: &'a FileMonitor) -> Self {
        monitor.pause();
        Self(monitor)
    }
}

impl Drop for PausedMonitor<'_> {
    fn drop(&mut self) {
        self.0.resume();
    }
}

/// `<prefix> <YYYY-mm-dd HH:MM:SS>: a.rs, b.rs and 3 more`.
pub fn auto_commit_message(prefix: &str, at: DateTime<Local>, paths: &[String]) -> String {
    let timestamp = at.format("%Y-%m-%d %H:%M:%S");
    if paths.is_empty() {
        return format!("{} {}", prefix, timestamp);
    }

    let mut files = paths
        .iter()
        .take(LISTED_FILES)
        .map(|p| {
            Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .collect::<Vec<_>>()
        .join(", ");
    if paths.len() > LISTED_FILES {
        files.push_str(&format!(" and {} more", paths.len() - LISTED_FILES));
    }
    format!("{} {}: {}", prefix, timestamp, files)
}

/// Delay before the next attempt after `failures` consecutive network
/// errors: the interval doubled per failure, at most eight times the interval.
pub fn backoff_delay(interval: Duration, failures: u32) -> Duration {
    let factor = (1u32 << failures.min(MAX_BACKOFF_SHIFT)).min(MAX_BACKOFF_FACTOR);
    interval * factor
}
