use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::filter::PathFilter;
use super::types::{ChangeBatch, MonitorStatus};

const CHANNEL_CAPACITY: usize = 4096;
const IDLE_TIMER: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("cannot watch {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// State shared between the monitor handle and its collector task.
#[derive(Default)]
struct Shared {
    /// Single-slot mailbox, consumed by exactly one reader.
    mailbox: Mutex<Option<ChangeBatch>>,
    delivered: Notify,
    resumed: Notify,
    paused: AtomicBool,
    pending_paths: AtomicUsize,
    events_accepted: AtomicU64,
    events_filtered: AtomicU64,
    batches_emitted: AtomicU64,
}

impl Shared {
    fn deliver(&self, batch: ChangeBatch) {
        {
            let mut slot = self.mailbox.lock();
            match slot.as_mut() {
                Some(unread) => unread.merge(batch),
                None => *slot = Some(batch),
            }
        }
        self.batches_emitted.fetch_add(1, Ordering::Relaxed);
        self.delivered.notify_one();
    }
}

struct Session {
    root: PathBuf,
    // Dropping the watcher releases the OS handles.
    _watcher: Option<RecommendedWatcher>,
    #[cfg_attr(not(test), allow(dead_code))]
    input: mpsc::Sender<Vec<PathBuf>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches a directory tree and hands out debounced [`ChangeBatch`]es.
///
/// Every accepted event extends the pending batch and pushes the deadline
/// out by the debounce window; the batch is emitted once the tree has been
/// quiet for that long. Pausing suspends emission only: events keep being
/// collected and the pending batch survives until [`FileMonitor::resume`].
pub struct FileMonitor {
    filter: Arc<PathFilter>,
    debounce: Duration,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl FileMonitor {
    pub fn new(filter: PathFilter, debounce: Duration) -> Self {
        Self {
            filter: Arc::new(filter),
            debounce,
            shared: Arc::new(Shared::default()),
            session: Mutex::new(None),
        }
    }

    pub fn start(&self, root: &Path) -> Result<(), MonitorError> {
        self.start_session(root, true)
    }

    fn start_session(&self, root: &Path, with_os_watcher: bool) -> Result<(), MonitorError> {
        let root = std::fs::canonicalize(root).map_err(|source| MonitorError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        self.stop();
        *self.shared.mailbox.lock() = None;
        self.shared.pending_paths.store(0, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Vec<PathBuf>>(CHANNEL_CAPACITY);

        let watcher = if with_os_watcher {
            let callback_tx = tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| match res {
                    Ok(event) if is_content_event(&event.kind) => {
                        // Overflow only loses path names; commits stage from git status.
                        let _ = callback_tx.try_send(event.paths);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("File watcher error: {}", e),
                },
                Config::default(),
            )?;
            watcher.watch(&root, RecursiveMode::Recursive)?;
            Some(watcher)
        } else {
            None
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(collect(
            root.clone(),
            self.filter.clone(),
            self.debounce,
            self.shared.clone(),
            rx,
            cancel.clone(),
        ));

        *self.session.lock() = Some(Session {
            root: root.clone(),
            _watcher: watcher,
            input: tx,
            cancel,
            task,
        });

        info!("File monitor started for {}", root.display());
        Ok(())
    }

    /// Tears down the OS watch and drops any batch still being collected.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel.cancel();
            session.task.abort();
            self.shared.pending_paths.store(0, Ordering::Relaxed);
            info!("File monitor stopped for {}", session.root.display());
        }
    }

    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::SeqCst) {
            debug!("File monitor paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::SeqCst) {
            self.shared.resumed.notify_one();
            debug!("File monitor resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.session.lock().as_ref().map(|s| s.root.clone())
    }

    /// Removes and returns the emitted batch, if any.
    pub fn take_batch(&self) -> Option<ChangeBatch> {
        self.shared.mailbox.lock().take()
    }

    /// True while events are being collected or an emitted batch is unread.
    pub fn has_pending(&self) -> bool {
        self.shared.pending_paths.load(Ordering::Relaxed) > 0 || self.shared.mailbox.lock().is_some()
    }

    /// Resolves once a batch is waiting in the mailbox.
    pub async fn changed(&self) {
        loop {
            let notified = self.shared.delivered.notified();
            if self.shared.mailbox.lock().is_some() {
                return;
            }
            notified.await;
        }
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            watching: self.is_watching(),
            paused: self.is_paused(),
            root: self.root(),
            pending_paths: self.shared.pending_paths.load(Ordering::Relaxed),
            batch_ready: self.shared.mailbox.lock().is_some(),
            events_accepted: self.shared.events_accepted.load(Ordering::Relaxed),
            events_filtered: self.shared.events_filtered.load(Ordering::Relaxed),
            batches_emitted: self.shared.batches_emitted.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn start_detached(&self, root: &Path) -> Result<(), MonitorError> {
        self.start_session(root, false)
    }

    #[cfg(test)]
    fn inject(&self, paths: Vec<PathBuf>) {
        if let Some(session) = self.session.lock().as_ref() {
            let _ = session.input.try_send(paths);
        }
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn collect(
    root: PathBuf,
    filter: Arc<PathFilter>,
    debounce: Duration,
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Vec<PathBuf>>,
    cancel: CancellationToken,
) {
    let mut pending: Option<ChangeBatch> = None;
    let timer = tokio::time::sleep(IDLE_TIMER);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                let Some(paths) = received else { break };
                let mut accepted = false;
                for path in paths {
                    match scoped_relative(&root, &filter, &path) {
                        Some(relative) => {
                            pending.get_or_insert_with(ChangeBatch::starting_now).record(relative);
                            shared.events_accepted.fetch_add(1, Ordering::Relaxed);
                            accepted = true;
                        }
                        None => {
                            shared.events_filtered.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                if accepted {
                    let len = pending.as_ref().map_or(0, ChangeBatch::len);
                    shared.pending_paths.store(len, Ordering::Relaxed);
                    timer.as_mut().reset(Instant::now() + debounce);
                }
            }
            _ = shared.resumed.notified() => {
                if pending.is_some() {
                    timer.as_mut().reset(Instant::now() + debounce);
                }
            }
            _ = &mut timer, if pending.is_some() && !shared.paused.load(Ordering::SeqCst) => {
                if let Some(batch) = pending.take() {
                    debug!(
                        "Emitting change batch: {} path(s) from {} event(s)",
                        batch.len(),
                        batch.event_count
                    );
                    shared.deliver(batch);
                }
                shared.pending_paths.store(0, Ordering::Relaxed);
                timer.as_mut().reset(Instant::now() + IDLE_TIMER);
            }
        }
    }

    debug!("Change collector for {} exited", root.display());
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Remove(RemoveKind::File)
            | EventKind::Remove(RemoveKind::Any)
    )
}

fn scoped_relative(root: &Path, filter: &PathFilter, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    if path.is_dir() || !filter.allows(relative) {
        return None;
    }
    Some(relative.to_path_buf())
}
