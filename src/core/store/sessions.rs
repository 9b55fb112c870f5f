use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;

use super::types::{SessionUpdate, WorkSession};
use super::{Store, now_millis};
use crate::core::orchestrator::SessionStatus;
use crate::core::text::truncate_chars;

const SESSION_NAME_CHARS: usize = 60;
const COORDINATION_MODEL: &str = "hub_spoke";

const SESSION_COLUMNS: &str = "id, session_name, goal, project_path, status, coordination_model,
     context_summary, metadata, started_at, updated_at, completed_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<WorkSession> {
    Ok(WorkSession {
        id: row.get(0)?,
        name: row.get(1)?,
        goal: row.get(2)?,
        project_path: row.get(3)?,
        status: row.get(4)?,
        coordination_model: row.get(5)?,
        context_summary: row.get(6)?,
        metadata: row.get(7)?,
        started_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

impl Store {
    pub async fn create_session(&self, goal: &str, project_path: &str) -> Result<WorkSession> {
        let session = WorkSession {
            id: uuid::Uuid::new_v4().to_string(),
            name: truncate_chars(goal, SESSION_NAME_CHARS).to_string(),
            goal: goal.to_string(),
            project_path: project_path.to_string(),
            status: SessionStatus::Active,
            coordination_model: COORDINATION_MODEL.to_string(),
            context_summary: None,
            metadata: None,
            started_at: now_millis(),
            updated_at: now_millis(),
            completed_at: None,
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO work_sessions (id, session_name, goal, project_path, status, coordination_model, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.name,
                session.goal,
                session.project_path,
                session.status,
                session.coordination_model,
                session.started_at,
                session.updated_at
            ],
        )?;
        info!("Created session {} ({})", session.id, session.name);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<WorkSession>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT {} FROM work_sessions WHERE id = ?1", SESSION_COLUMNS);
        Ok(db
            .query_row(&sql, params![session_id], session_from_row)
            .optional()?)
    }

    /// Most recently updated session whose id starts with `prefix`.
    pub async fn find_session_by_prefix(&self, prefix: &str) -> Result<Option<WorkSession>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE substr(id, 1, length(?1)) = ?1
             ORDER BY updated_at DESC, rowid DESC LIMIT 1",
            SESSION_COLUMNS
        );
        Ok(db
            .query_row(&sql, params![prefix], session_from_row)
            .optional()?)
    }

    /// Applies a partial update. Returns `false` when no session has `session_id`.
    pub async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE work_sessions SET
                status = COALESCE(?2, status),
                context_summary = COALESCE(?3, context_summary),
                metadata = COALESCE(?4, metadata),
                updated_at = ?5,
                completed_at = CASE
                    WHEN ?2 IN ('completed', 'failed') THEN ?5
                    WHEN ?2 = 'active' THEN NULL
                    ELSE completed_at
                END
             WHERE id = ?1",
            params![
                session_id,
                update.status,
                update.context_summary,
                update.metadata,
                now_millis()
            ],
        )?;
        Ok(rows > 0)
    }

    pub async fn get_active_session(&self) -> Result<Option<WorkSession>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE status = 'active'
             ORDER BY updated_at DESC, rowid DESC LIMIT 1",
            SESSION_COLUMNS
        );
        Ok(db.query_row(&sql, [], session_from_row).optional()?)
    }

    /// Sessions in recency order, optionally filtered by status.
    pub async fn list_sessions(&self, status: Option<SessionStatus>) -> Result<Vec<WorkSession>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE ?1 IS NULL OR status = ?1
             ORDER BY updated_at DESC, rowid DESC",
            SESSION_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![status], session_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
