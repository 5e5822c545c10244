//! CheckpointStorage：数据访问层
//!
//! Durable half of the checkpoint store. Each mutation commits its own
//! transaction before returning, so the caller can update in-memory state
//! knowing the change survives a restart.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, SqlitePool};
use std::str::FromStr;

use super::models::{
    timestamp_to_datetime, Checkpoint, CheckpointResult, CheckpointTrigger, NewCheckpoint,
};
use crate::git::CommitRef;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS checkpoints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_ref TEXT NOT NULL,
        description TEXT NOT NULL,
        trigger_kind TEXT NOT NULL,
        commit_summary TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS checkpoint_cursor (
        singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
        checkpoint_id INTEGER REFERENCES checkpoints(id)
    )
    "#,
];

/// Checkpoint 数据访问层
pub struct CheckpointStorage {
    pool: SqlitePool,
}

impl CheckpointStorage {
    pub async fn open(db_path: &Path) -> CheckpointResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        tracing::debug!("CheckpointStorage: opened {}", db_path.display());
        Ok(storage)
    }

    /// Single-connection in-memory database; nothing survives a drop.
    pub async fn open_in_memory() -> CheckpointResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> CheckpointResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Whole log in insertion order plus the id the cursor points at.
    pub async fn load(&self) -> CheckpointResult<(Vec<Checkpoint>, Option<i64>)> {
        let rows = sqlx::query(
            r#"
            SELECT id, commit_ref, description, trigger_kind, commit_summary, created_at
            FROM checkpoints
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let checkpoints = rows
            .into_iter()
            .map(|r| {
                Ok(Checkpoint {
                    id: r.get("id"),
                    commit_ref: CommitRef::new(r.get::<String, _>("commit_ref")),
                    description: r.get("description"),
                    trigger: CheckpointTrigger::from_str(&r.get::<String, _>("trigger_kind"))?,
                    commit_summary: r.get("commit_summary"),
                    created_at: timestamp_to_datetime(r.get("created_at")),
                })
            })
            .collect::<CheckpointResult<Vec<_>>>()?;

        let cursor: Option<i64> =
            sqlx::query("SELECT checkpoint_id FROM checkpoint_cursor WHERE singleton = 0")
                .fetch_optional(&self.pool)
                .await?
                .and_then(|r| r.get::<Option<i64>, _>("checkpoint_id"));

        Ok((checkpoints, cursor))
    }

    /// Inserts a checkpoint and, when `move_cursor` is set, points the
    /// cursor at it in the same transaction.
    pub async fn insert(
        &self,
        checkpoint: &NewCheckpoint,
        move_cursor: bool,
    ) -> CheckpointResult<Checkpoint> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO checkpoints (commit_ref, description, trigger_kind, commit_summary, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(checkpoint.commit_ref.as_str())
        .bind(&checkpoint.description)
        .bind(checkpoint.trigger.as_str())
        .bind(&checkpoint.commit_summary)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        if move_cursor {
            Self::write_cursor(&mut tx, id).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            "CheckpointStorage: inserted checkpoint id={}, trigger={}, commit={}",
            id,
            checkpoint.trigger,
            checkpoint.commit_ref.short()
        );

        Ok(Checkpoint {
            id,
            commit_ref: checkpoint.commit_ref.clone(),
            description: checkpoint.description.clone(),
            trigger: checkpoint.trigger,
            commit_summary: checkpoint.commit_summary.clone(),
            created_at: timestamp_to_datetime(now),
        })
    }

    pub async fn set_cursor(&self, checkpoint_id: i64) -> CheckpointResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_cursor(&mut tx, checkpoint_id).await?;
        tx.commit().await?;
        tracing::debug!("CheckpointStorage: cursor -> {}", checkpoint_id);
        Ok(())
    }

    async fn write_cursor(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        checkpoint_id: i64,
    ) -> CheckpointResult<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoint_cursor (singleton, checkpoint_id) VALUES (0, ?)
            ON CONFLICT(singleton) DO UPDATE SET checkpoint_id = excluded.checkpoint_id
            "#,
        )
        .bind(checkpoint_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
