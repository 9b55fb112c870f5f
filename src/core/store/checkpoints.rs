use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;
use tracing::debug;

use super::types::{CheckpointRecord, json_column, optional_json_column};
use super::{Store, now_millis};

const CHECKPOINT_COLUMNS: &str = "id, checkpoint_name, session_id, agent_id, state_data, context_snapshot,
     sequence_number, parent_checkpoint_id, created_at";

fn checkpoint_from_row(row: &Row<'_>) -> rusqlite::Result<CheckpointRecord> {
    Ok(CheckpointRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        session_id: row.get(2)?,
        agent_id: row.get(3)?,
        state: json_column(row, 4)?,
        context_snapshot: optional_json_column(row, 5)?,
        sequence: row.get(6)?,
        parent_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl Store {
    /// Saves a checkpoint. Its parent is the latest earlier checkpoint by the
    /// same agent in the same session; the sequence counter is per session
    /// and independent of the event log.
    pub async fn save_checkpoint(
        &self,
        session_id: &str,
        agent_id: &str,
        name: &str,
        state: &Value,
        context_snapshot: Option<&Value>,
    ) -> Result<CheckpointRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM checkpoints WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let parent_id: Option<String> = tx
            .query_row(
                "SELECT id FROM checkpoints WHERE session_id = ?1 AND agent_id = ?2
                 ORDER BY sequence_number DESC LIMIT 1",
                params![session_id, agent_id],
                |row| row.get(0),
            )
            .optional()?;
        let record = CheckpointRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            state: state.clone(),
            context_snapshot: context_snapshot.cloned(),
            sequence,
            parent_id,
            created_at: now_millis(),
        };
        tx.execute(
            "INSERT INTO checkpoints (id, checkpoint_name, session_id, agent_id, state_data, context_snapshot,
                sequence_number, parent_checkpoint_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.name,
                record.session_id,
                record.agent_id,
                record.state.to_string(),
                record.context_snapshot.as_ref().map(Value::to_string),
                record.sequence,
                record.parent_id,
                record.created_at
            ],
        )?;
        tx.commit()?;
        debug!(
            "Checkpoint #{} '{}' saved for {} in session {}",
            record.sequence, record.name, record.agent_id, record.session_id
        );
        Ok(record)
    }

    pub async fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT {} FROM checkpoints WHERE id = ?1", CHECKPOINT_COLUMNS);
        Ok(db
            .query_row(&sql, params![checkpoint_id], checkpoint_from_row)
            .optional()?)
    }

    /// Latest checkpoint of a session, optionally restricted to one agent.
    pub async fn latest_checkpoint(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Option<CheckpointRecord>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM checkpoints WHERE session_id = ?1 AND (?2 IS NULL OR agent_id = ?2)
             ORDER BY sequence_number DESC LIMIT 1",
            CHECKPOINT_COLUMNS
        );
        Ok(db
            .query_row(&sql, params![session_id, agent_id], checkpoint_from_row)
            .optional()?)
    }

    /// Newest first.
    pub async fn list_checkpoints(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckpointRecord>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM checkpoints WHERE session_id = ?1
             ORDER BY sequence_number DESC LIMIT ?2",
            CHECKPOINT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, limit as i64], checkpoint_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
