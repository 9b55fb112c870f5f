#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "paused" => Some(SessionStatus::Paused),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event type tags written to the per-session event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    SessionResumed,
    SessionCompleted,
    TasksDecomposed,
    TaskRetry,
    AgentTaskStarted,
    AgentTaskCompleted,
    AgentTaskFailed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session.started",
            EventKind::SessionResumed => "session.resumed",
            EventKind::SessionCompleted => "session.completed",
            EventKind::TasksDecomposed => "tasks.decomposed",
            EventKind::TaskRetry => "task.retry",
            EventKind::AgentTaskStarted => "agent.task_started",
            EventKind::AgentTaskCompleted => "agent.task_completed",
            EventKind::AgentTaskFailed => "agent.task_failed",
        }
    }
}

/// One entry of the decomposer's plan. `dependencies` are 0-based indices
/// into the same plan.
///
/// Only `role` and `goal` are strict. A priority that is not a whole number
/// falls back to 1 and unusable dependency entries are dropped one by one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecomposedTask {
    #[serde(alias = "agent")]
    pub role: String,
    pub goal: String,
    #[serde(default = "default_priority", deserialize_with = "lenient_priority")]
    pub priority: i64,
    #[serde(default, deserialize_with = "lenient_dependencies")]
    pub dependencies: Vec<usize>,
}

fn default_priority() -> i64 {
    1
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
    Ok(whole_number(&value).unwrap_or_else(default_priority))
}

fn lenient_dependencies<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Null => Vec::new(),
        single => vec![single],
    };
    Ok(entries
        .iter()
        .filter_map(whole_number)
        .filter_map(|n| usize::try_from(n).ok())
        .collect())
}

/// Integers, integral floats (`2.0`) and numeric strings (`"2"`).
fn whole_number(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outcome of one task as reported back to the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    /// Worker id, or `"none"` when no worker ran the task.
    pub agent: String,
    pub goal: String,
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestrationSummary {
    pub session_id: String,
    pub success: bool,
    pub tasks_completed: usize,
    /// Includes skipped tasks.
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
    pub total_tasks: usize,
    pub results: Vec<TaskOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub max_retries: u32,
    pub token_budget: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            token_budget: crate::core::context::DEFAULT_TOKEN_BUDGET,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
}
