use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::orchestrator::{SessionStatus, TaskStatus};

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        SessionStatus::from_status(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown session status '{}'", raw).into()))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        TaskStatus::from_status(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown task status '{}'", raw).into()))
    }
}

/// Reads a TEXT column holding JSON.
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkSession {
    pub id: String,
    pub name: String,
    pub goal: String,
    pub project_path: String,
    pub status: SessionStatus,
    pub coordination_model: String,
    pub context_summary: Option<String>,
    pub metadata: Option<String>,
    pub started_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub context_summary: Option<String>,
    pub metadata: Option<String>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Input payload persisted with each task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskInput {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

/// A task about to be persisted. `dependencies` index into the batch it is
/// created with.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: String,
    pub input: TaskInput,
    pub priority: i64,
    pub dependencies: Vec<usize>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub task_type: String,
    pub session_id: String,
    pub assigned_agent: Option<String>,
    pub parent_task_id: Option<String>,
    pub priority: i64,
    pub status: TaskStatus,
    pub input: TaskInput,
    pub result_data: Option<Value>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub dependencies: Vec<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TaskRecord {
    /// Stored output of a completed task.
    pub fn output(&self) -> Option<&str> {
        self.result_data
            .as_ref()
            .and_then(|data| data.get("output"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventRecord {
    pub id: String,
    pub event_type: String,
    pub session_id: String,
    pub agent_id: Option<String>,
    pub sequence: i64,
    pub data: Value,
    pub metadata: Option<Value>,
    pub timestamp: i64,
}

/// Filters for `Store::list_events`. Results are always in sequence order.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub after_seq: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckpointRecord {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub agent_id: String,
    pub state: Value,
    pub context_snapshot: Option<Value>,
    pub sequence: i64,
    pub parent_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Busy,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentRegistryRecord {
    pub agent_id: String,
    pub name: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub status: String,
    pub current_session_id: Option<String>,
    pub last_heartbeat: Option<i64>,
}
