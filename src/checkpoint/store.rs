//! CheckpointStore: append-only checkpoint log with a navigation cursor.
//!
//! Readers work on an `Arc` snapshot and never wait for writers. Writers are
//! serialized, persist first, and only then publish the new snapshot.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::models::{
    Checkpoint, CheckpointError, CheckpointResult, CheckpointTrigger, HistoryEntry,
    HistoryExport, NewCheckpoint, Position,
};
use super::storage::CheckpointStorage;
use crate::git::CommitRef;

pub const DATABASE_FILE_NAME: &str = "checkpoints.db";

#[derive(Debug, Clone, Default)]
struct LogSnapshot {
    entries: Vec<Checkpoint>,
    cursor: Option<usize>,
}

impl LogSnapshot {
    fn index_of(&self, id: i64) -> Option<usize> {
        // ids are strictly increasing in log order
        self.entries.binary_search_by_key(&id, |c| c.id).ok()
    }

    fn revert_target(&self, steps: usize) -> CheckpointResult<usize> {
        let cursor = self.cursor.ok_or(CheckpointError::OutOfRange {
            requested: steps,
            available: 0,
        })?;
        cursor
            .checked_sub(steps)
            .ok_or(CheckpointError::OutOfRange {
                requested: steps,
                available: cursor,
            })
    }

    fn forward_target(&self, steps: usize) -> CheckpointResult<usize> {
        let cursor = self.cursor.ok_or(CheckpointError::OutOfRange {
            requested: steps,
            available: 0,
        })?;
        let available = self.entries.len() - 1 - cursor;
        if steps > available {
            return Err(CheckpointError::OutOfRange {
                requested: steps,
                available,
            });
        }
        Ok(cursor + steps)
    }

    fn position(&self) -> Position {
        match self.cursor {
            Some(cursor) => Position {
                cursor: Some(cursor),
                total: self.entries.len(),
                current_id: self.entries.get(cursor).map(|c| c.id),
                steps_back: cursor,
                steps_forward: self.entries.len() - 1 - cursor,
            },
            None => Position {
                total: self.entries.len(),
                ..Position::default()
            },
        }
    }
}

pub struct CheckpointStore {
    storage: CheckpointStorage,
    snapshot: RwLock<Arc<LogSnapshot>>,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Opens (or creates) `<state_dir>/checkpoints.db` and restores the log
    /// and cursor from it.
    pub async fn open(state_dir: &Path) -> CheckpointResult<Self> {
        let storage = CheckpointStorage::open(&state_dir.join(DATABASE_FILE_NAME)).await?;
        let store = Self::with_storage(storage).await?;
        info!(
            "Checkpoint store opened with {} checkpoint(s)",
            store.len()
        );
        Ok(store)
    }

    pub async fn in_memory() -> CheckpointResult<Self> {
        Self::with_storage(CheckpointStorage::open_in_memory().await?).await
    }

    async fn with_storage(storage: CheckpointStorage) -> CheckpointResult<Self> {
        let (entries, cursor_id) = storage.load().await?;
        let mut snapshot = LogSnapshot {
            entries,
            cursor: None,
        };
        snapshot.cursor = match cursor_id {
            Some(id) => snapshot.index_of(id),
            None => None,
        };
        if snapshot.cursor.is_none() && !snapshot.entries.is_empty() {
            snapshot.cursor = Some(snapshot.entries.len() - 1);
        }

        Ok(Self {
            storage,
            snapshot: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        })
    }

    fn snapshot(&self) -> Arc<LogSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().entries.is_empty()
    }

    pub async fn append(
        &self,
        commit_ref: CommitRef,
        description: impl Into<String>,
        trigger: CheckpointTrigger,
        commit_summary: impl Into<String>,
    ) -> CheckpointResult<Checkpoint> {
        let _guard = self.write_lock.lock().await;
        let new = NewCheckpoint {
            commit_ref,
            description: description.into(),
            trigger,
            commit_summary: commit_summary.into(),
        };
        let first = self.is_empty();
        // entries logged before any cursor exists become the cursor
        let move_cursor = trigger.moves_cursor() || first;
        let checkpoint = self.storage.insert(&new, move_cursor).await?;

        let current = self.snapshot();
        let mut next = LogSnapshot {
            entries: current.entries.clone(),
            cursor: current.cursor,
        };
        next.entries.push(checkpoint.clone());
        if move_cursor {
            next.cursor = Some(next.entries.len() - 1);
        }
        *self.snapshot.write() = Arc::new(next);

        debug!(
            "Checkpoint {} ({}) recorded at {}",
            checkpoint.id,
            checkpoint.trigger,
            checkpoint.commit_ref.short()
        );
        Ok(checkpoint)
    }

    /// Checkpoint `steps` back from the cursor, without moving it.
    pub fn peek_revert(&self, steps: usize) -> CheckpointResult<Checkpoint> {
        let snapshot = self.snapshot();
        let index = snapshot.revert_target(steps)?;
        Ok(snapshot.entries[index].clone())
    }

    /// Checkpoint `steps` ahead of the cursor, without moving it.
    pub fn peek_forward(&self, steps: usize) -> CheckpointResult<Checkpoint> {
        let snapshot = self.snapshot();
        let index = snapshot.forward_target(steps)?;
        Ok(snapshot.entries[index].clone())
    }

    pub fn find(&self, id: i64) -> CheckpointResult<Checkpoint> {
        let snapshot = self.snapshot();
        snapshot
            .index_of(id)
            .map(|i| snapshot.entries[i].clone())
            .ok_or(CheckpointError::NotFound(id))
    }

    pub async fn revert(&self, steps: usize) -> CheckpointResult<Checkpoint> {
        let _guard = self.write_lock.lock().await;
        let index = self.snapshot().revert_target(steps)?;
        self.move_cursor(index).await
    }

    pub async fn forward(&self, steps: usize) -> CheckpointResult<Checkpoint> {
        let _guard = self.write_lock.lock().await;
        let index = self.snapshot().forward_target(steps)?;
        self.move_cursor(index).await
    }

    pub async fn goto(&self, id: i64) -> CheckpointResult<Checkpoint> {
        let _guard = self.write_lock.lock().await;
        let index = self
            .snapshot()
            .index_of(id)
            .ok_or(CheckpointError::NotFound(id))?;
        self.move_cursor(index).await
    }

    /// Caller holds the write lock.
    async fn move_cursor(&self, index: usize) -> CheckpointResult<Checkpoint> {
        let current = self.snapshot();
        let target = current.entries[index].clone();
        if current.cursor == Some(index) {
            return Ok(target);
        }

        self.storage.set_cursor(target.id).await?;
        *self.snapshot.write() = Arc::new(LogSnapshot {
            entries: current.entries.clone(),
            cursor: Some(index),
        });
        debug!("Checkpoint cursor moved to {} (index {})", target.id, index);
        Ok(target)
    }

    pub fn current(&self) -> Option<Checkpoint> {
        let snapshot = self.snapshot();
        snapshot.cursor.map(|i| snapshot.entries[i].clone())
    }

    pub fn position(&self) -> Position {
        self.snapshot().position()
    }

    /// Newest-first view over the log as it is right now. `offset` skips the
    /// newest entries.
    pub fn history(&self, limit: usize, offset: usize) -> History {
        History {
            snapshot: self.snapshot(),
            limit,
            offset,
        }
    }

    /// Case-insensitive match on description and commit summary, newest first.
    pub fn search(&self, query: &str) -> Vec<Checkpoint> {
        let needle = query.trim().to_lowercase();
        self.snapshot()
            .entries
            .iter()
            .rev()
            .filter(|c| needle.is_empty() || c.matches(&needle))
            .cloned()
            .collect()
    }

    pub async fn export(&self, path: &Path) -> CheckpointResult<()> {
        let snapshot = self.snapshot();
        let document = HistoryExport {
            exported_at: Utc::now(),
            cursor: snapshot.cursor,
            checkpoints: snapshot.entries.clone(),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&document)?).await?;
        info!(
            "Exported {} checkpoint(s) to {}",
            document.checkpoints.len(),
            path.display()
        );
        Ok(())
    }

    pub async fn close(&self) {
        self.storage.close().await;
    }
}

/// Point-in-time history listing. Iterating is lazy and can be repeated;
/// later appends to the store are not visible.
#[derive(Debug, Clone)]
pub struct History {
    snapshot: Arc<LogSnapshot>,
    limit: usize,
    offset: usize,
}

impl History {
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            history: self,
            next: 0,
        }
    }

    /// Entries this listing yields.
    pub fn len(&self) -> usize {
        self.snapshot
            .entries
            .len()
            .saturating_sub(self.offset)
            .min(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the whole log at snapshot time.
    pub fn total(&self) -> usize {
        self.snapshot.entries.len()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = HistoryEntry;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct HistoryIter<'a> {
    history: &'a History,
    next: usize,
}

impl Iterator for HistoryIter<'_> {
    type Item = HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.history.len() {
            return None;
        }
        let snapshot = &self.history.snapshot;
        let index = snapshot.entries.len() - 1 - self.history.offset - self.next;
        self.next += 1;

        let cursor = snapshot.cursor;
        Some(HistoryEntry {
            checkpoint: snapshot.entries[index].clone(),
            index,
            is_current: cursor == Some(index),
            relative_position: cursor.map_or(0, |c| index as i64 - c as i64),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.history.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HistoryIter<'_> {}
