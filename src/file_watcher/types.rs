use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One coalesced burst of filesystem activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    /// Relative to the watch root.
    pub paths: BTreeSet<PathBuf>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub event_count: usize,
}

impl ChangeBatch {
    pub(crate) fn starting_now() -> Self {
        let now = Utc::now();
        Self {
            paths: BTreeSet::new(),
            first_seen_at: now,
            last_seen_at: now,
            event_count: 0,
        }
    }

    pub(crate) fn record(&mut self, path: PathBuf) {
        self.paths.insert(path);
        self.last_seen_at = Utc::now();
        self.event_count += 1;
    }

    /// Folds a later batch into this one.
    pub fn merge(&mut self, later: ChangeBatch) {
        self.paths.extend(later.paths);
        self.first_seen_at = self.first_seen_at.min(later.first_seen_at);
        self.last_seen_at = self.last_seen_at.max(later.last_seen_at);
        self.event_count += later.event_count;
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub watching: bool,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Paths collected but not yet emitted.
    pub pending_paths: usize,
    pub batch_ready: bool,
    pub events_accepted: u64,
    pub events_filtered: u64,
    pub batches_emitted: u64,
}
