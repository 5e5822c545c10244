/*!
 * Untracked-file quarantine
 *
 * Before a pull, untracked local files whose path also exists in the
 * incoming tree are moved here so the merge cannot refuse or clobber them.
 * Every entry is recorded in `manifest.json` next to the stored copies and
 * stays until it is explicitly restored or discarded.
 */

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{GitError, GitErrorCode};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuarantinedFile {
    pub id: String,
    /// Relative to the working tree root.
    pub original_path: String,
    pub stored_path: PathBuf,
    pub quarantined_at: DateTime<Utc>,
    pub sha256: String,
    pub size: u64,
}

/// What became of a quarantined file after a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Merged file has the same content; the stored copy was dropped.
    Identical,
    /// Merged file starts with the stored content.
    Extended,
    /// The merge left no file at that path; the copy was moved back.
    Restored,
    Diverged,
}

pub struct Quarantine {
    dir: PathBuf,
    // serializes manifest read-modify-write cycles
    lock: Mutex<()>,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn list(&self) -> Result<Vec<QuarantinedFile>, GitError> {
        let _guard = self.lock.lock().await;
        self.read_manifest().await
    }

    /// Moves `relative` out of the working tree at `root`.
    pub async fn stash(&self, root: &Path, relative: &str) -> Result<QuarantinedFile, GitError> {
        let _guard = self.lock.lock().await;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GitError::io(format!("create quarantine {}", self.dir.display()), e))?;

        let source = root.join(relative);
        let content = fs::read(&source)
            .await
            .map_err(|e| GitError::io(format!("read {}", source.display()), e))?;

        let id = Uuid::new_v4().to_string();
        let stored_path = self.dir.join(&id);
        move_file(&source, &stored_path).await?;

        let entry = QuarantinedFile {
            id,
            original_path: relative.to_string(),
            stored_path,
            quarantined_at: Utc::now(),
            sha256: hex::encode(Sha256::digest(&content)),
            size: content.len() as u64,
        };

        let mut manifest = self.read_manifest().await?;
        manifest.push(entry.clone());
        self.write_manifest(&manifest).await?;

        info!("Quarantined untracked file {} as {}", relative, entry.id);
        Ok(entry)
    }

    /// Puts the stored copy back. When the original path is taken, the copy
    /// lands next to it with the entry id appended so both versions survive.
    /// Returns the path written, relative to `root`.
    pub async fn restore(&self, root: &Path, id: &str) -> Result<String, GitError> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.read_manifest().await?;
        let index = position(&manifest, id)?;
        let entry = manifest.remove(index);

        let mut relative = entry.original_path.clone();
        if fs::try_exists(root.join(&relative)).await.unwrap_or(false) {
            relative = format!("{}.quarantined-{}", relative, &entry.id[..8.min(entry.id.len())]);
        }
        let destination = root.join(&relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::io(format!("create {}", parent.display()), e))?;
        }
        move_file(&entry.stored_path, &destination).await?;
        self.write_manifest(&manifest).await?;

        info!("Restored quarantined file {} to {}", entry.id, relative);
        Ok(relative)
    }

    pub async fn discard(&self, id: &str) -> Result<QuarantinedFile, GitError> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.read_manifest().await?;
        let index = position(&manifest, id)?;
        let entry = manifest.remove(index);

        if let Err(e) = fs::remove_file(&entry.stored_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(GitError::io(format!("remove {}", entry.stored_path.display()), e));
            }
        }
        self.write_manifest(&manifest).await?;

        info!("Discarded quarantined file {} ({})", entry.id, entry.original_path);
        Ok(entry)
    }

    /// Compares a stored copy with the post-merge working tree and settles
    /// the entry accordingly.
    pub async fn reconcile(
        &self,
        root: &Path,
        entry: &QuarantinedFile,
    ) -> Result<Reconciliation, GitError> {
        let merged_path = root.join(&entry.original_path);
        let merged = match fs::read(&merged_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.restore(root, &entry.id).await?;
                return Ok(Reconciliation::Restored);
            }
            Err(e) => return Err(GitError::io(format!("read {}", merged_path.display()), e)),
        };
        let stored = fs::read(&entry.stored_path)
            .await
            .map_err(|e| GitError::io(format!("read {}", entry.stored_path.display()), e))?;

        if stored == merged {
            self.discard(&entry.id).await?;
            debug!("Quarantined {} matches the merged file", entry.original_path);
            Ok(Reconciliation::Identical)
        } else if merged.starts_with(&stored) {
            Ok(Reconciliation::Extended)
        } else {
            warn!(
                "Quarantined {} differs from the merged file",
                entry.original_path
            );
            Ok(Reconciliation::Diverged)
        }
    }

    async fn read_manifest(&self) -> Result<Vec<QuarantinedFile>, GitError> {
        let path = self.dir.join(MANIFEST_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                GitError::new(
                    GitErrorCode::ParseError,
                    format!("corrupt quarantine manifest {}: {}", path.display(), e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(GitError::io(format!("read {}", path.display()), e)),
        }
    }

    async fn write_manifest(&self, manifest: &[QuarantinedFile]) -> Result<(), GitError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GitError::io(format!("create quarantine {}", self.dir.display()), e))?;
        let path = self.dir.join(MANIFEST_FILE);
        let tmp = self.dir.join(format!("{}.tmp", MANIFEST_FILE));
        let content = serde_json::to_string_pretty(manifest).map_err(|e| {
            GitError::new(GitErrorCode::ParseError, format!("serialize manifest: {}", e))
        })?;
        fs::write(&tmp, content)
            .await
            .map_err(|e| GitError::io(format!("write {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| GitError::io(format!("replace {}", path.display()), e))
    }
}

fn position(manifest: &[QuarantinedFile], id: &str) -> Result<usize, GitError> {
    manifest.iter().position(|q| q.id == id).ok_or_else(|| {
        GitError::new(
            GitErrorCode::NotFound,
            format!("no quarantined file with id {}", id),
        )
    })
}

async fn move_file(from: &Path, to: &Path) -> Result<(), GitError> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    fs::copy(from, to)
        .await
        .map_err(|e| GitError::io(format!("copy {} to {}", from.display(), to.display()), e))?;
    fs::remove_file(from)
        .await
        .map_err(|e| GitError::io(format!("remove {}", from.display()), e))
}
