mod checkpoints;
mod events;
mod registry;
mod sessions;
mod tasks;
pub mod types;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::platform::{NativePlatform, Platform};

pub use types::*;

pub const DB_FILE: &str = "swarm.db";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is still shared by {0} other handle(s)")]
    StillInUse(usize),
}

/// Handle to the single SQLite connection. Clones share the connection;
/// `close` tears it down once every other clone is gone.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(&data_dir);

        let db_path = data_dir.join(DB_FILE);
        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);

        let mode: String = db.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("Opened {:?} (journal_mode={})", db_path, mode);

        let store = Self::with_connection(db)?;
        info!("Store ready at {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS work_sessions (
                id TEXT PRIMARY KEY,
                session_name TEXT NOT NULL,
                goal TEXT NOT NULL,
                project_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                coordination_model TEXT NOT NULL DEFAULT 'hub_spoke',
                context_summary TEXT,
                metadata TEXT,
                started_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                completed_at INTEGER
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS agent_registry (
                agent_id TEXT PRIMARY KEY,
                agent_name TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                capabilities TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'idle',
                current_session_id TEXT,
                last_heartbeat INTEGER,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                checkpoint_name TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES work_sessions(id),
                agent_id TEXT NOT NULL,
                state_data TEXT NOT NULL,
                context_snapshot TEXT,
                sequence_number INTEGER NOT NULL,
                parent_checkpoint_id TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(session_id, sequence_number)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES work_sessions(id),
                agent_id TEXT,
                sequence_number INTEGER NOT NULL,
                event_data TEXT NOT NULL,
                metadata TEXT,
                timestamp INTEGER NOT NULL,
                UNIQUE(session_id, sequence_number)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES work_sessions(id),
                assigned_agent TEXT,
                parent_task_id TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                input_data TEXT NOT NULL,
                result_data TEXT,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                dependencies TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS context_invalidations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES work_sessions(id),
                agent_id TEXT,
                invalidation_type TEXT NOT NULL,
                reason TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        db.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_events_session_seq ON events(session_id, sequence_number);
             CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
             CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, sequence_number);
             CREATE INDEX IF NOT EXISTS idx_checkpoints_agent ON checkpoints(session_id, agent_id);
             CREATE INDEX IF NOT EXISTS idx_tasks_session_status ON tasks(session_id, status);
             CREATE INDEX IF NOT EXISTS idx_sessions_status ON work_sessions(status, updated_at);",
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Closes the connection. Fails while other clones of this handle exist.
    pub async fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.db)
            .map_err(|shared| StoreError::StillInUse(Arc::strong_count(&shared) - 1))?;
        let db = mutex.into_inner();
        db.close().map_err(|(_, e)| e)?;
        debug!("Store closed");
        Ok(())
    }
}

/// Epoch milliseconds, the unit every timestamp column uses.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
pub fn test_store() -> Store {
    Store::open_in_memory().expect("open in-memory store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creates_all_tables() {
        let store = test_store();
        let db = store.db.lock().await;
        let mut stmt = db
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        for table in [
            "agent_registry",
            "checkpoints",
            "context_invalidations",
            "events",
            "tasks",
            "work_sessions",
        ] {
            assert!(names.iter().any(|n| n == table), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn close_succeeds_for_sole_handle() {
        let store = test_store();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_refuses_while_shared() {
        let store = test_store();
        let other = store.clone();
        let err = store.close().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::StillInUse(1))
        ));
        // The failed close dropped its handle, so the survivor is now sole owner.
        other.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_on_disk_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert!(dir.path().join(DB_FILE).exists());
        store.close().await.unwrap();
    }
}
