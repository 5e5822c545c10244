/*!
 * SyncEngine：同步引擎句柄
 *
 * Explicit handle over the sync loop. Clones share one engine; every method
 * is safe to call from outside the loop task. Internal synchronization is
 * limited to the execution guard (one sync cycle or navigation at a time)
 * and the run's cancellation tokens. Operations running in a caller's task
 * take child tokens of the run, so `stop()` reaches them too.
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cycle::{
    auto_commit_message, backoff_delay, record_checkpoint, Cycle, CycleMode, CycleReport,
    PausedMonitor,
};
use super::error::{SyncError, SyncResult};
use super::state::{EngineState, PauseReason, StopOutcome};
use super::status::{process_memory, EngineStatus, SyncStats};
use crate::checkpoint::{Checkpoint, CheckpointStore, CheckpointTrigger, History};
use crate::config::{ConfigStore, Profile, SyncSettings};
use crate::file_watcher::{FileMonitor, PathFilter};
use crate::git::{
    GitError, GitErrorCode, GitRepository, QuarantinedFile, RemoteRepository, StageScope,
};

/// Everything `start()` brings up; lives until the next start or
/// reinitialization so history stays readable after a stop.
struct Components {
    repo: Arc<dyn RemoteRepository>,
    store: CheckpointStore,
    monitor: FileMonitor,
    settings: SyncSettings,
}

impl Components {
    fn cycle<'a>(&'a self, token: &'a CancellationToken) -> Cycle<'a> {
        Cycle {
            repo: self.repo.as_ref(),
            store: &self.store,
            monitor: &self.monitor,
            settings: &self.settings,
            token,
        }
    }
}

struct LoopHandle {
    /// Graceful shutdown, observed between phases.
    token: CancellationToken,
    /// Emergency shutdown, drops in-flight operations where they stand.
    halt: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn cancel(&self) {
        self.token.cancel();
        self.halt.cancel();
    }
}

/// Tokens handed to an operation running outside the loop task.
struct OperationTokens {
    token: CancellationToken,
    halt: CancellationToken,
}

#[derive(Debug, Clone, Default)]
struct Shared {
    state: EngineState,
    pause_reason: Option<PauseReason>,
    last_error: Option<String>,
    last_sync_time: Option<DateTime<Utc>>,
    stats: SyncStats,
}

enum CycleHealth {
    Healthy,
    Offline,
    Paused,
    Failing,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Back(usize),
    Forward(usize),
    Id(i64),
}

struct EngineInner {
    settings: RwLock<SyncSettings>,
    /// Injected adapter; `None` opens a [`GitRepository`] on start.
    fixed_repo: Option<Arc<dyn RemoteRepository>>,
    components: RwLock<Option<Arc<Components>>>,
    runner: Mutex<Option<LoopHandle>>,
    shared: RwLock<Shared>,
    guard: tokio::sync::Mutex<()>,
    resumed: Notify,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings) -> Self {
        Self::build(settings, None)
    }

    /// Engine over an already-open repository adapter.
    pub fn with_repository(settings: SyncSettings, repo: Arc<dyn RemoteRepository>) -> Self {
        Self::build(settings, Some(repo))
    }

    fn build(settings: SyncSettings, fixed_repo: Option<Arc<dyn RemoteRepository>>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                settings: RwLock::new(settings),
                fixed_repo,
                components: RwLock::new(None),
                runner: Mutex::new(None),
                shared: RwLock::new(Shared::default()),
                guard: tokio::sync::Mutex::new(()),
                resumed: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.inner.settings.read().clone()
    }

    pub fn state(&self) -> EngineState {
        self.inner.shared.read().state.clone()
    }

    // ===== Lifecycle =====

    pub async fn start(&self) -> SyncResult<()> {
        {
            let mut shared = self.inner.shared.write();
            if shared.state != EngineState::Stopped {
                return Err(SyncError::InvalidState {
                    operation: "start",
                    state: shared.state.clone(),
                });
            }
            shared.state = EngineState::Starting;
        }

        let settings = self.settings();
        info!(
            "Starting sync engine for {} ({})",
            settings.code_directory.display(),
            settings.remote_url
        );

        let components = match self.inner.bring_up(settings).await {
            Ok(components) => Arc::new(components),
            Err(e) => {
                error!("Sync engine failed to start: {}", e);
                let mut shared = self.inner.shared.write();
                shared.state = EngineState::Failed(e.to_string());
                shared.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        *self.inner.components.write() = Some(components.clone());
        {
            let mut shared = self.inner.shared.write();
            shared.state = EngineState::Running;
            shared.pause_reason = None;
            shared.last_error = None;
        }

        let token = CancellationToken::new();
        let halt = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.inner.clone(),
            components,
            token.clone(),
            halt.clone(),
        ));
        *self.inner.runner.lock() = Some(LoopHandle { token, halt, task });

        info!("Sync engine running");
        Ok(())
    }

    /// Signals the loop and any in-flight operation to exit at their next
    /// safe point and waits up to `sync.stopTimeoutSeconds` for both;
    /// escalates to a forced teardown when the wait runs out.
    pub async fn stop(&self) -> SyncResult<StopOutcome> {
        {
            let mut shared = self.inner.shared.write();
            match shared.state {
                EngineState::Stopped => return Ok(StopOutcome::Graceful),
                EngineState::Running | EngineState::Paused => {
                    shared.state = EngineState::Stopping;
                }
                ref other => {
                    return Err(SyncError::InvalidState {
                        operation: "stop",
                        state: other.clone(),
                    })
                }
            }
        }

        let timeout = self.stop_timeout();
        info!("Stopping sync engine (timeout {:?})", timeout);

        let handle = self.inner.runner.lock().take();
        let outcome = match handle {
            Some(mut handle) => {
                let deadline = tokio::time::Instant::now() + timeout;
                handle.token.cancel();
                if let Some(components) = self.inner.components.read().as_ref() {
                    components.monitor.stop();
                }
                // the loop first, then whatever still holds the execution guard
                let settled = tokio::time::timeout_at(deadline, &mut handle.task)
                    .await
                    .is_ok()
                    && tokio::time::timeout_at(deadline, self.inner.guard.lock())
                        .await
                        .is_ok();
                if settled {
                    StopOutcome::Graceful
                } else {
                    warn!(
                        "Sync did not stop within {:?}, escalating to emergency stop",
                        timeout
                    );
                    self.inner.tear_down(Some(handle));
                    StopOutcome::Forced
                }
            }
            None => StopOutcome::Graceful,
        };

        self.inner.tear_down(None);
        info!("Sync engine stopped ({:?})", outcome);
        Ok(outcome)
    }

    /// Tears the loop and monitor down without waiting for the in-flight
    /// operation. Pending git processes are killed with their task, and
    /// manual syncs or navigations in other tasks are dropped at their
    /// current await point.
    pub fn emergency_stop(&self) {
        let handle = self.inner.runner.lock().take();
        if handle.is_some() {
            warn!("Emergency stop requested");
        }
        self.inner.tear_down(handle);
    }

    fn stop_timeout(&self) -> Duration {
        match self.inner.components.read().as_ref() {
            Some(components) => components.settings.stop_timeout,
            None => self.inner.settings.read().stop_timeout,
        }
    }

    // ===== Sync control =====

    /// Runs one cycle now with both phases forced. Works from `Running` and
    /// from `Paused`; a successful cycle from `Paused` resumes the loop.
    pub async fn manual_sync(&self) -> SyncResult<CycleReport> {
        let components = self.inner.active_components("sync")?;
        let _running = self.inner.guard.try_lock().map_err(|_| SyncError::Busy)?;
        let tokens = self.inner.operation_tokens("sync")?;

        info!("Manual sync requested");
        let cycle = components.cycle(&tokens.token);
        let result = tokio::select! {
            result = cycle.run(CycleMode::Manual) => result,
            _ = tokens.halt.cancelled() => {
                warn!("Manual sync dropped by emergency stop");
                Ok(CycleReport::interrupted())
            }
        };
        self.inner.record_cycle(&result);
        result
    }

    /// Clears the pause reason and lets the loop continue.
    pub fn resolve_and_resume(&self) -> SyncResult<()> {
        {
            let mut shared = self.inner.shared.write();
            if shared.state != EngineState::Paused {
                return Err(SyncError::InvalidState {
                    operation: "resume",
                    state: shared.state.clone(),
                });
            }
            shared.state = EngineState::Running;
            shared.pause_reason = None;
            shared.last_error = None;
        }
        self.inner.resumed.notify_one();
        info!("Sync resumed");
        Ok(())
    }

    // ===== Checkpoint navigation =====

    pub async fn revert(&self, steps: usize) -> SyncResult<Checkpoint> {
        self.navigate("revert", Target::Back(steps)).await
    }

    pub async fn forward(&self, steps: usize) -> SyncResult<Checkpoint> {
        self.navigate("forward", Target::Forward(steps)).await
    }

    pub async fn goto(&self, id: i64) -> SyncResult<Checkpoint> {
        self.navigate("goto", Target::Id(id)).await
    }

    async fn navigate(&self, operation: &'static str, target: Target) -> SyncResult<Checkpoint> {
        let components = self.inner.active_components(operation)?;
        let _running = self.inner.guard.try_lock().map_err(|_| SyncError::Busy)?;
        let tokens = self.inner.operation_tokens(operation)?;

        tokio::select! {
            result = self.navigate_steps(&components, &tokens.token, operation, target) => result,
            _ = tokens.halt.cancelled() => {
                warn!("{} dropped by emergency stop", operation);
                Err(self.inner.stopped(operation))
            }
        }
    }

    async fn navigate_steps(
        &self,
        components: &Components,
        token: &CancellationToken,
        operation: &'static str,
        target: Target,
    ) -> SyncResult<Checkpoint> {
        let store = &components.store;
        let repo = components.repo.as_ref();
        let prefix = &components.settings.commit_prefix;

        // Validate before touching the working tree.
        let destination = match target {
            Target::Back(steps) => store.peek_revert(steps)?,
            Target::Forward(steps) => store.peek_forward(steps)?,
            Target::Id(id) => store.find(id)?,
        };
        let label = format!(
            "checkpoint #{} ({})",
            destination.id,
            destination.commit_ref.short()
        );

        let _paused = PausedMonitor::new(&components.monitor);

        let before = format!("before {} to {}", operation, label);
        if let Some(commit) = repo
            .commit(&commit_message(prefix, &before), StageScope::Worktree)
            .await?
        {
            record_checkpoint(
                repo,
                store,
                &commit,
                format!("Before {} to #{}", operation, destination.id),
                CheckpointTrigger::PreRevert,
            )
            .await?;
        }

        if token.is_cancelled() {
            return Err(self.inner.stopped(operation));
        }
        let moved = repo
            .checkout_commit(
                &destination.commit_ref,
                &commit_message(prefix, &format!("{} to {}", operation, label)),
            )
            .await?;

        let landed = match target {
            Target::Back(steps) => store.revert(steps).await?,
            Target::Forward(steps) => store.forward(steps).await?,
            Target::Id(id) => store.goto(id).await?,
        };

        if let Some(commit) = moved {
            record_checkpoint(
                repo,
                store,
                &commit,
                format!("After {} to #{}", operation, landed.id),
                CheckpointTrigger::PostRevert,
            )
            .await?;
        }

        info!("{} landed on {}", operation, label);
        Ok(landed)
    }

    /// Commits whatever is pending and records a manual checkpoint at HEAD.
    pub async fn checkpoint(&self, description: &str) -> SyncResult<Checkpoint> {
        let components = self.inner.active_components("checkpoint")?;
        let _running = self.inner.guard.try_lock().map_err(|_| SyncError::Busy)?;
        let repo = components.repo.as_ref();

        let description = description.trim();
        let message = if description.is_empty() {
            auto_commit_message(&components.settings.commit_prefix, Local::now(), &[])
        } else {
            commit_message(&components.settings.commit_prefix, description)
        };

        let commit = match repo.commit(&message, StageScope::All).await? {
            Some(commit) => commit,
            None => repo.head().await?.ok_or_else(|| {
                SyncError::Git(GitError::new(
                    GitErrorCode::NotFound,
                    "the repository has no commits to checkpoint",
                ))
            })?,
        };

        let description = if description.is_empty() {
            "Manual checkpoint".to_string()
        } else {
            description.to_string()
        };
        let checkpoint = record_checkpoint(
            repo,
            &components.store,
            &commit,
            description,
            CheckpointTrigger::Manual,
        )
        .await?;
        info!("Checkpoint #{} created at {}", checkpoint.id, commit.short());
        Ok(checkpoint)
    }

    // ===== Reads =====

    pub fn status(&self) -> EngineStatus {
        let shared = self.inner.shared.read().clone();
        let components = self.inner.components.read().clone();
        let conflict = shared
            .pause_reason
            .as_ref()
            .and_then(|r| r.conflict().cloned());

        EngineStatus {
            state: shared.state,
            last_sync_time: shared.last_sync_time,
            remediation_hint: conflict.as_ref().map(|c| c.remediation_hint()),
            conflict,
            pause_reason: shared.pause_reason,
            last_error: shared.last_error,
            memory_usage: process_memory(),
            stats: shared.stats,
            position: components
                .as_ref()
                .map(|c| c.store.position())
                .unwrap_or_default(),
            pending_changes: components
                .as_ref()
                .is_some_and(|c| c.monitor.has_pending()),
            monitor: components.as_ref().map(|c| c.monitor.status()),
        }
    }

    pub fn history(&self, limit: usize, offset: usize) -> SyncResult<History> {
        Ok(self.inner.components("read history")?.store.history(limit, offset))
    }

    pub fn search(&self, query: &str) -> SyncResult<Vec<Checkpoint>> {
        Ok(self.inner.components("search history")?.store.search(query))
    }

    pub async fn export_history(&self, path: &Path) -> SyncResult<()> {
        let components = self.inner.components("export history")?;
        components.store.export(path).await?;
        Ok(())
    }

    // ===== Quarantine =====

    pub async fn quarantined(&self) -> SyncResult<Vec<QuarantinedFile>> {
        let components = self.inner.components("list quarantine")?;
        Ok(components.repo.quarantined().await?)
    }

    /// Puts a quarantined file back into the working tree and returns the
    /// path it was written to.
    pub async fn restore_quarantined(&self, id: &str) -> SyncResult<String> {
        let components = self.inner.components("restore quarantined file")?;
        let _running = self.inner.guard.try_lock().map_err(|_| SyncError::Busy)?;
        let path = components.repo.restore_quarantined(id).await?;
        info!("Restored quarantined file {} to {}", id, path);
        Ok(path)
    }

    pub async fn discard_quarantined(&self, id: &str) -> SyncResult<QuarantinedFile> {
        let components = self.inner.components("discard quarantined file")?;
        let _running = self.inner.guard.try_lock().map_err(|_| SyncError::Busy)?;
        let entry = components.repo.discard_quarantined(id).await?;
        info!("Discarded quarantined copy of {}", entry.original_path);
        Ok(entry)
    }

    // ===== Configuration =====

    /// Writes the profile into `config` and reloads the engine settings from
    /// it. Only allowed while the engine is stopped.
    pub async fn switch_profile(&self, config: &mut ConfigStore, profile: &Profile) -> SyncResult<()> {
        self.inner.require_idle("switch profile")?;
        config
            .apply_profile(profile)
            .await
            .map_err(|e| SyncError::Configuration {
                field: "profile".to_string(),
                message: format!("{:#}", e),
            })?;
        let settings = SyncSettings::from_store(config)?;
        self.reinitialize(settings).await
    }

    /// Replaces the settings and drops everything the last start opened.
    /// The only way out of `Failed`.
    pub async fn reinitialize(&self, settings: SyncSettings) -> SyncResult<()> {
        self.inner.require_idle("reinitialize")?;
        settings.validate()?;

        let previous = self.inner.components.write().take();
        if let Some(components) = previous {
            components.monitor.stop();
            components.store.close().await;
        }

        *self.inner.settings.write() = settings;
        let mut shared = self.inner.shared.write();
        shared.state = EngineState::Stopped;
        shared.pause_reason = None;
        shared.last_error = None;
        info!("Sync engine reinitialized");
        Ok(())
    }
}

impl EngineInner {
    async fn bring_up(&self, settings: SyncSettings) -> SyncResult<Components> {
        settings.validate()?;

        let repo: Arc<dyn RemoteRepository> = match &self.fixed_repo {
            Some(repo) => repo.clone(),
            None => Arc::new(GitRepository::open_or_clone(&settings).await?),
        };

        let state_dir = settings
            .state_directory
            .clone()
            .unwrap_or_else(|| repo.state_dir());
        let store = CheckpointStore::open(&state_dir).await?;
        if store.is_empty() {
            if let Some(head) = repo.head().await? {
                record_checkpoint(
                    repo.as_ref(),
                    &store,
                    &head,
                    "Initial checkpoint".to_string(),
                    CheckpointTrigger::Manual,
                )
                .await?;
            }
        }

        let filter = PathFilter::new(&settings.watch_patterns, &settings.exclude_patterns)
            .map_err(|e| SyncError::Configuration {
                field: "local.watchPatterns".to_string(),
                message: e.to_string(),
            })?;
        let monitor = FileMonitor::new(filter, settings.debounce);
        monitor.start(&settings.code_directory)?;

        Ok(Components {
            repo,
            store,
            monitor,
            settings,
        })
    }

    fn components(&self, operation: &'static str) -> SyncResult<Arc<Components>> {
        self.components
            .read()
            .clone()
            .ok_or_else(|| SyncError::InvalidState {
                operation,
                state: self.shared.read().state.clone(),
            })
    }

    fn active_components(&self, operation: &'static str) -> SyncResult<Arc<Components>> {
        let state = self.shared.read().state.clone();
        if !state.is_active() {
            return Err(SyncError::InvalidState { operation, state });
        }
        self.components(operation)
    }

    fn operation_tokens(&self, operation: &'static str) -> SyncResult<OperationTokens> {
        match self.runner.lock().as_ref() {
            Some(handle) => Ok(OperationTokens {
                token: handle.token.child_token(),
                halt: handle.halt.child_token(),
            }),
            None => Err(self.stopped(operation)),
        }
    }

    fn stopped(&self, operation: &'static str) -> SyncError {
        SyncError::InvalidState {
            operation,
            state: self.shared.read().state.clone(),
        }
    }

    fn require_idle(&self, operation: &'static str) -> SyncResult<()> {
        let state = self.shared.read().state.clone();
        if state.is_idle() {
            Ok(())
        } else {
            Err(SyncError::InvalidState { operation, state })
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.read().state == EngineState::Paused
    }

    /// Folds the result of a cycle into status and state.
    fn record_cycle(&self, result: &SyncResult<CycleReport>) -> CycleHealth {
        let now = Utc::now();
        let mut shared = self.shared.write();

        match result {
            Ok(report) => {
                if report.cancelled {
                    return CycleHealth::Healthy;
                }
                shared.last_sync_time = Some(now);
                shared.last_error = None;
                if report.pulled() {
                    shared.stats.pulls += 1;
                }
                if report.pushed {
                    shared.stats.pushes += 1;
                }
                shared.stats.commits += report.commits.len() as u64;
                if report.pulled() || report.pushed || !report.commits.is_empty() {
                    shared.stats.last_activity = Some(now);
                }
                if shared.state == EngineState::Paused {
                    shared.state = EngineState::Running;
                    shared.pause_reason = None;
                    self.resumed.notify_one();
                    info!("Sync cycle succeeded, resuming");
                }
                CycleHealth::Healthy
            }
            Err(SyncError::Conflict(conflict)) => {
                shared.stats.conflicts += 1;
                warn!("Sync paused: {}", conflict);
                warn!("{}", conflict.remediation_hint());
                Self::pause(&mut shared, PauseReason::Conflict(conflict.clone()));
                CycleHealth::Paused
            }
            Err(SyncError::Timeout { operation, timeout }) => {
                shared.stats.errors += 1;
                warn!("Sync paused: {} timed out after {:?}", operation, timeout);
                Self::pause(
                    &mut shared,
                    PauseReason::Timeout {
                        operation: operation.clone(),
                        timeout: *timeout,
                    },
                );
                CycleHealth::Paused
            }
            Err(SyncError::Network(message)) => {
                shared.stats.errors += 1;
                shared.last_error = Some(format!("network error: {}", message));
                warn!("Remote unreachable, will retry: {}", message);
                CycleHealth::Offline
            }
            Err(e) => {
                shared.stats.errors += 1;
                shared.last_error = Some(e.to_string());
                error!("Sync cycle failed: {}", e);
                CycleHealth::Failing
            }
        }
    }

    fn pause(shared: &mut Shared, reason: PauseReason) {
        shared.last_error = Some(reason.to_string());
        if shared.state.is_active() {
            shared.state = EngineState::Paused;
        }
        shared.pause_reason = Some(reason);
    }

    /// Emergency stop from inside the loop task when resident memory crosses
    /// `sync.maxMemoryMb`. Returns true when the loop must exit.
    fn memory_exceeded(&self, settings: &SyncSettings) -> bool {
        let Some(limit) = settings.memory_limit() else {
            return false;
        };
        let Some(used) = process_memory() else {
            return false;
        };
        if used <= limit {
            return false;
        }

        let reason = format!(
            "emergency stop: memory usage {} MB exceeds limit of {} MB",
            used / (1024 * 1024),
            settings.max_memory_mb
        );
        error!("{}", reason);
        // the loop is the caller, so its task is left to return on its own
        if let Some(handle) = self.runner.lock().take() {
            handle.cancel();
        }
        self.tear_down(None);
        let mut shared = self.shared.write();
        shared.stats.errors += 1;
        shared.pause_reason = None;
        shared.last_error = Some(reason);
        true
    }

    fn tear_down(&self, handle: Option<LoopHandle>) {
        if let Some(handle) = handle {
            handle.cancel();
            handle.task.abort();
            warn!("Sync loop aborted");
        }
        if let Some(components) = self.components.read().as_ref() {
            components.monitor.stop();
        }
        let mut shared = self.shared.write();
        if !matches!(shared.state, EngineState::Failed(_)) {
            shared.state = EngineState::Stopped;
        }
    }
}

/// `<prefix> <YYYY-mm-dd HH:MM:SS>: <text>`.
fn commit_message(prefix: &str, text: &str) -> String {
    format!("{} {}: {}", prefix, Local::now().format("%Y-%m-%d %H:%M:%S"), text)
}

async fn run_loop(
    inner: Arc<EngineInner>,
    components: Arc<Components>,
    token: CancellationToken,
    halt: CancellationToken,
) {
    let interval = components.settings.sync_interval;
    let mut failures = 0u32;
    info!("Sync loop started, interval {:?}", interval);

    loop {
        if token.is_cancelled() {
            break;
        }
        if inner.is_paused() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = inner.resumed.notified() => continue,
            }
        }

        let mut wake_on_changes = false;
        let delay = match inner.guard.try_lock() {
            Ok(_running) => {
                let cycle = components.cycle(&token);
                let result = tokio::select! {
                    result = cycle.run(CycleMode::Scheduled) => result,
                    _ = halt.cancelled() => break,
                };
                match inner.record_cycle(&result) {
                    CycleHealth::Healthy => {
                        failures = 0;
                        wake_on_changes = components.settings.auto_push;
                        interval
                    }
                    CycleHealth::Offline => {
                        failures += 1;
                        backoff_delay(interval, failures)
                    }
                    CycleHealth::Paused => Duration::ZERO,
                    CycleHealth::Failing => interval,
                }
            }
            Err(_) => {
                debug!("Another sync operation is running, skipping tick");
                interval
            }
        };

        if inner.memory_exceeded(&components.settings) {
            break;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
            _ = components.monitor.changed(), if wake_on_changes => {
                debug!("Local changes settled, syncing early");
            }
        }
    }

    info!("Sync loop exited");
}
