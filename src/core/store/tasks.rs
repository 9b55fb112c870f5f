use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde_json::json;

use super::types::{NewTask, TaskRecord, json_column, optional_json_column};
use super::{Store, now_millis};
use crate::core::orchestrator::TaskStatus;

const TASK_COLUMNS: &str = "id, task_type, session_id, assigned_agent, parent_task_id, priority, status,
     input_data, result_data, error_message, retry_count, max_retries, dependencies,
     created_at, started_at, completed_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        task_type: row.get(1)?,
        session_id: row.get(2)?,
        assigned_agent: row.get(3)?,
        parent_task_id: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        input: json_column(row, 7)?,
        result_data: optional_json_column(row, 8)?,
        error_message: row.get(9)?,
        retry_count: row.get(10)?,
        max_retries: row.get(11)?,
        dependencies: json_column(row, 12)?,
        created_at: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

impl Store {
    /// Persists a batch of tasks as `pending`, in order, inside one
    /// transaction. Dependency index `i` resolves to the id of the `i`-th
    /// task of the batch; out-of-range indices are dropped. Returns the new
    /// ids in batch order.
    pub async fn create_tasks(
        &self,
        session_id: &str,
        tasks: &[NewTask],
        max_retries: u32,
    ) -> Result<Vec<String>> {
        let ids: Vec<String> = tasks
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        for (task, id) in tasks.iter().zip(&ids) {
            let dependencies: Vec<&String> = task
                .dependencies
                .iter()
                .filter_map(|idx| ids.get(*idx))
                .collect();
            tx.execute(
                "INSERT INTO tasks (id, task_type, session_id, priority, status, input_data, max_retries, dependencies, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    task.task_type,
                    session_id,
                    task.priority,
                    TaskStatus::Pending,
                    serde_json::to_string(&task.input)?,
                    max_retries as i64,
                    serde_json::to_string(&dependencies)?,
                    now_millis()
                ],
            )?;
        }
        tx.commit()?;
        Ok(ids)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        Ok(db
            .query_row(&sql, params![task_id], task_from_row)
            .optional()?)
    }

    /// All tasks of a session in creation order.
    pub async fn list_tasks(&self, session_id: &str) -> Result<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE session_id = ?1 ORDER BY rowid ASC",
            TASK_COLUMNS
        );
        self.query_tasks(&sql, session_id).await
    }

    /// Pending and failed tasks, lowest priority value first.
    pub async fn list_resumable_tasks(&self, session_id: &str) -> Result<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE session_id = ?1 AND status IN ('pending', 'failed')
             ORDER BY priority ASC, rowid ASC",
            TASK_COLUMNS
        );
        self.query_tasks(&sql, session_id).await
    }

    async fn query_tasks(&self, sql: &str, session_id: &str) -> Result<Vec<TaskRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(params![session_id], task_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn mark_task_running(&self, task_id: &str, agent_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE tasks SET status = ?2, assigned_agent = ?3, started_at = ?4 WHERE id = ?1",
            params![task_id, TaskStatus::Running, agent_id, now_millis()],
        )?;
        Ok(())
    }

    /// Stores `{"output": ..}` and clears any error left by earlier attempts.
    pub async fn complete_task(&self, task_id: &str, output: &str, retry_count: u32) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE tasks SET status = ?2, result_data = ?3, error_message = NULL,
                retry_count = ?4, completed_at = ?5
             WHERE id = ?1",
            params![
                task_id,
                TaskStatus::Completed,
                json!({ "output": output }).to_string(),
                retry_count as i64,
                now_millis()
            ],
        )?;
        Ok(())
    }

    pub async fn fail_task(&self, task_id: &str, error: &str, retry_count: u32) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE tasks SET status = ?2, error_message = ?3, retry_count = ?4 WHERE id = ?1",
            params![task_id, TaskStatus::Failed, error, retry_count as i64],
        )?;
        Ok(())
    }

    pub async fn skip_task(&self, task_id: &str, reason: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE tasks SET status = ?2, error_message = ?3 WHERE id = ?1",
            params![task_id, TaskStatus::Skipped, reason],
        )?;
        Ok(())
    }

    /// Puts tasks interrupted mid-flight back to `pending`. Returns how many.
    pub async fn reset_running_tasks(&self, session_id: &str) -> Result<usize> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE tasks SET status = ?2, started_at = NULL WHERE session_id = ?1 AND status = ?3",
            params![session_id, TaskStatus::Pending, TaskStatus::Running],
        )?;
        Ok(rows)
    }
}
