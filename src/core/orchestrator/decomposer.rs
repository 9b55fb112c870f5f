//! Turns one goal into an ordered, dependency-annotated plan.

use serde_json::Value;
use std::path::Path;
use tracing::{error, info};

use crate::core::agent::WorkerRegistry;
use crate::core::backend::{Backend, run_json};

use super::DecomposedTask;

const FALLBACK_ROLE: &str = "backend";

pub(crate) fn decomposition_prompt(registry: &WorkerRegistry, goal: &str) -> String {
    let roster: Vec<String> = registry
        .iter()
        .map(|w| format!("- {}: {}", w.role(), w.description()))
        .collect();
    format!(
        "You are the task decomposition engine of a multi-agent development system.

Split the development goal below into subtasks, each owned by one specialist.

Available specialists:
{roster}

Goal: \"{goal}\"

Inspect the project in the current directory and produce the subtasks in execution order.
For each subtask give the specialist role, a concrete goal, a priority (1 = most urgent) and
the 0-based indexes of earlier subtasks it depends on.

Answer with a JSON array, for example:
[
  {{ \"role\": \"database\", \"goal\": \"Create a users table with email and password_hash\", \"priority\": 1, \"dependencies\": [] }},
  {{ \"role\": \"backend\", \"goal\": \"Add POST /api/auth/register\", \"priority\": 2, \"dependencies\": [0] }}
]

Rules:
- Order by dependency: database, then backend, then frontend, then qa, then devops
- Only include specialists the goal actually needs
- Keep every goal specific and actionable
- Dependencies may only point at earlier indexes",
        roster = roster.join("\n"),
    )
}

/// Accepts a non-empty array whose entries all carry a role and a goal.
/// Loose priorities and dependency lists are normalised per entry.
pub(crate) fn parse_plan(value: Value) -> Option<Vec<DecomposedTask>> {
    let tasks: Vec<DecomposedTask> = serde_json::from_value(value).ok()?;
    if tasks.is_empty()
        || tasks
            .iter()
            .any(|t| t.role.trim().is_empty() || t.goal.trim().is_empty())
    {
        return None;
    }
    Some(tasks)
}

pub(crate) fn fallback_plan(goal: &str) -> Vec<DecomposedTask> {
    vec![DecomposedTask {
        role: FALLBACK_ROLE.to_string(),
        goal: goal.to_string(),
        priority: 1,
        dependencies: Vec::new(),
    }]
}

/// Never fails: backend errors and unusable answers produce the single-task
/// fallback plan.
pub async fn decompose_goal(
    backend: &dyn Backend,
    registry: &WorkerRegistry,
    goal: &str,
    project_path: &Path,
) -> Vec<DecomposedTask> {
    info!("Decomposing goal: {}", goal);
    let prompt = decomposition_prompt(registry, goal);
    let plan = match run_json(backend, &prompt, project_path).await {
        Ok(value) => parse_plan(value),
        Err(e) => {
            error!("Task decomposition failed: {}", e);
            None
        }
    };
    match plan {
        Some(tasks) => {
            info!("Decomposed into {} tasks", tasks.len());
            tasks
        }
        None => {
            error!("Decomposition produced no usable plan; falling back to a single task");
            fallback_plan(goal)
        }
    }
}
