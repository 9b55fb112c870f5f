//! Session engine: decomposes a goal, persists the plan and drives each task
//! through a specialist, one at a time.
//!
//! A fresh run honours plan dependencies and retries failed attempts. A
//! resumed run picks up pending and failed tasks in priority order and gives
//! each a single attempt.

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::agent::{Specialist, TaskResult, WorkerEnv, WorkerRegistry, WorkerTask};
use crate::core::backend::Backend;
use crate::core::store::{NewTask, SessionUpdate, Store, TaskInput, TaskRecord};
use crate::core::text::truncate_chars;

use super::{
    EventKind, OrchestrationSummary, OrchestratorError, OrchestratorSettings, SessionStatus,
    TaskOutcome, TaskStatus, can_transition, decompose_goal, route_task,
};

const ORCHESTRATOR_AGENT: &str = "orchestrator";
const FINAL_CHECKPOINT: &str = "Session complete";
const DEPENDENCY_NOT_MET: &str = "Dependency not met";
const NO_AGENT: &str = "No agent available";
const NO_WORKER: &str = "none";
const DEPENDENCY_SEPARATOR: &str = "\n---\n";

const STORED_OUTPUT_CHARS: usize = 5000;
const STORED_ERROR_CHARS: usize = 1000;
const OUTCOME_OUTPUT_CHARS: usize = 500;

pub struct Orchestrator {
    env: WorkerEnv,
    registry: WorkerRegistry,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Builds the engine and mirrors `registry` into the store.
    pub async fn new(
        store: Store,
        backend: Arc<dyn Backend>,
        registry: WorkerRegistry,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        if registry.is_empty() {
            warn!("No specialists registered; every task will fail with '{}'", NO_AGENT);
        }
        registry.persist(&store).await?;
        Ok(Self {
            env: WorkerEnv {
                store,
                backend,
                token_budget: settings.token_budget,
            },
            registry,
            settings,
        })
    }

    pub fn store(&self) -> &Store {
        &self.env.store
    }

    pub async fn orchestrate(&self, goal: &str, project_path: &Path) -> Result<OrchestrationSummary> {
        let store = self.store();
        let project = project_path.to_string_lossy();
        let session = store.create_session(goal, &project).await?;
        info!("Session created: {}", session.id);
        self.emit(
            &session.id,
            EventKind::SessionStarted,
            None,
            json!({ "goal": goal, "projectPath": project }),
        )
        .await?;

        let plan = decompose_goal(self.env.backend.as_ref(), &self.registry, goal, project_path).await;
        self.emit(
            &session.id,
            EventKind::TasksDecomposed,
            None,
            json!({
                "count": plan.len(),
                "tasks": plan
                    .iter()
                    .map(|t| json!({ "role": t.role, "goal": t.goal }))
                    .collect::<Vec<_>>(),
            }),
        )
        .await?;

        let new_tasks: Vec<NewTask> = plan
            .iter()
            .map(|t| NewTask {
                task_type: t.role.clone(),
                input: TaskInput {
                    goal: t.goal.clone(),
                    constraints: Vec::new(),
                },
                priority: t.priority,
                dependencies: t.dependencies.clone(),
            })
            .collect();
        let task_ids = store
            .create_tasks(&session.id, &new_tasks, self.settings.max_retries)
            .await?;

        let mut outputs: HashMap<usize, String> = HashMap::new();
        let mut progress: Vec<(String, String, TaskStatus)> = Vec::new();
        let mut results = Vec::with_capacity(plan.len());
        let mut skipped = 0;

        for (index, (task, task_id)) in plan.iter().zip(&task_ids).enumerate() {
            let (task_outcome, status) = if let Some(dep) =
                task.dependencies.iter().find(|d| !outputs.contains_key(*d))
            {
                warn!("Dependency {} not completed for task {}, skipping", dep, index);
                store.skip_task(task_id, DEPENDENCY_NOT_MET).await?;
                (
                    outcome(task_id, NO_WORKER, &task.goal, false, DEPENDENCY_NOT_MET),
                    TaskStatus::Skipped,
                )
            } else if let Some(worker) = route_task(&self.registry, &task.role, &task.goal) {
                let dependency_output: Vec<&str> = task
                    .dependencies
                    .iter()
                    .filter_map(|d| outputs.get(d).map(String::as_str))
                    .collect();
                let dependency_output = dependency_output.join(DEPENDENCY_SEPARATOR);
                let work = WorkerTask {
                    task_id,
                    session_id: &session.id,
                    task_type: &task.role,
                    goal: &task.goal,
                    constraints: &[],
                    dependencies_output: Some(dependency_output.as_str()),
                };
                let result = self.run_with_retries(worker, &work, project_path).await?;
                if result.success {
                    outputs.insert(index, result.output.clone());
                }
                let status = if result.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                (
                    outcome(task_id, worker.id(), &task.goal, result.success, &result.output),
                    status,
                )
            } else {
                error!("No agent found for task: {}", task.goal);
                store.fail_task(task_id, NO_AGENT, 0).await?;
                (
                    outcome(task_id, NO_WORKER, &task.goal, false, NO_AGENT),
                    TaskStatus::Failed,
                )
            };

            if status == TaskStatus::Skipped {
                skipped += 1;
            }
            results.push(task_outcome);
            progress.push((task.role.clone(), task.goal.clone(), status));
            self.record_progress(&session.id, goal, &progress, plan.len())
                .await?;
        }

        let summary = self
            .finalize(&session.id, results, skipped, plan.len())
            .await?;

        store
            .save_checkpoint(
                &session.id,
                ORCHESTRATOR_AGENT,
                FINAL_CHECKPOINT,
                &json!({
                    "tasksCompleted": summary.tasks_completed,
                    "tasksFailed": summary.tasks_failed,
                    "results": summary
                        .results
                        .iter()
                        .map(|r| json!({ "agent": r.agent, "goal": r.goal, "success": r.success }))
                        .collect::<Vec<_>>(),
                }),
                None,
            )
            .await?;
        self.emit(
            &session.id,
            EventKind::SessionCompleted,
            None,
            json!({
                "success": summary.success,
                "tasksCompleted": summary.tasks_completed,
                "tasksFailed": summary.tasks_failed,
            }),
        )
        .await?;

        Ok(summary)
    }

    /// Re-runs the pending and failed tasks of an existing session. Each task
    /// gets one attempt and dependencies are not re-checked; stored outputs of
    /// completed dependencies are still handed over.
    pub async fn resume_session(&self, session_id: &str) -> Result<OrchestrationSummary> {
        let store = self.store();
        let session = store
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        if !can_transition(session.status, SessionStatus::Active) {
            warn!(
                "Resuming session {} from status '{}'",
                session.id, session.status
            );
        }
        store
            .update_session(&session.id, SessionUpdate::status(SessionStatus::Active))
            .await?;
        self.emit(
            &session.id,
            EventKind::SessionResumed,
            None,
            json!({ "sessionId": session.id }),
        )
        .await?;

        let tasks = store.list_resumable_tasks(&session.id).await?;
        info!("Resuming {} task(s) of session {}", tasks.len(), session.id);
        let project_path = Path::new(&session.project_path);
        let mut progress: Vec<(String, String, TaskStatus)> = Vec::new();
        let mut results = Vec::with_capacity(tasks.len());

        for task in &tasks {
            let retry_count = u32::try_from(task.retry_count).unwrap_or(0);
            let Some(worker) = route_task(&self.registry, &task.task_type, &task.input.goal)
            else {
                error!("No agent found for task: {}", task.input.goal);
                store.fail_task(&task.id, NO_AGENT, retry_count + 1).await?;
                results.push(outcome(&task.id, NO_WORKER, &task.input.goal, false, NO_AGENT));
                progress.push((task.task_type.clone(), task.input.goal.clone(), TaskStatus::Failed));
                continue;
            };

            store.mark_task_running(&task.id, worker.id()).await?;
            let dependency_output = self.stored_dependency_output(task).await?;
            let work = WorkerTask {
                task_id: &task.id,
                session_id: &session.id,
                task_type: &task.task_type,
                goal: &task.input.goal,
                constraints: &task.input.constraints,
                dependencies_output: Some(dependency_output.as_str()),
            };
            let result = worker.execute(&self.env, &work, project_path).await?;
            let status = if result.success {
                store
                    .complete_task(
                        &task.id,
                        truncate_chars(&result.output, STORED_OUTPUT_CHARS),
                        retry_count,
                    )
                    .await?;
                TaskStatus::Completed
            } else {
                store
                    .fail_task(
                        &task.id,
                        truncate_chars(&result.output, STORED_ERROR_CHARS),
                        retry_count + 1,
                    )
                    .await?;
                TaskStatus::Failed
            };
            info!("Task {} {}", task.id, status);

            results.push(outcome(
                &task.id,
                worker.id(),
                &task.input.goal,
                result.success,
                &result.output,
            ));
            progress.push((task.task_type.clone(), task.input.goal.clone(), status));
            self.record_progress(&session.id, &session.goal, &progress, tasks.len())
                .await?;
        }

        let total = results.len();
        self.finalize(&session.id, results, 0, total)
            .await
    }

    /// Pauses an interrupted session, hands its `running` tasks back to
    /// `pending` and frees the workers that were busy on it. Returns the
    /// number of tasks reset.
    pub async fn pause_session(&self, session_id: &str) -> Result<usize> {
        let store = self.store();
        let session = store
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        if !can_transition(session.status, SessionStatus::Paused) {
            warn!(
                "Not pausing session {}: status is '{}'",
                session.id, session.status
            );
            return Ok(0);
        }
        store
            .update_session(&session.id, SessionUpdate::status(SessionStatus::Paused))
            .await?;
        let reset = store.reset_running_tasks(&session.id).await?;
        let released = store.release_session_agents(&session.id).await?;
        info!(
            "Session {} paused ({} task(s) reset, {} worker(s) released)",
            session.id, reset, released
        );
        Ok(reset)
    }

    /// Runs `task` up to `1 + max_retries` times and stores the final result.
    async fn run_with_retries(
        &self,
        worker: Specialist,
        task: &WorkerTask<'_>,
        project_path: &Path,
    ) -> Result<TaskResult> {
        let store = self.store();
        let max_retries = self.settings.max_retries;
        store.mark_task_running(task.task_id, worker.id()).await?;

        let mut attempt = 0;
        loop {
            let result = worker.execute(&self.env, task, project_path).await?;
            if result.success {
                store
                    .complete_task(
                        task.task_id,
                        truncate_chars(&result.output, STORED_OUTPUT_CHARS),
                        attempt,
                    )
                    .await?;
                info!("Task completed by {}: {}", worker.name(), task.goal);
                return Ok(result);
            }
            if attempt >= max_retries {
                store
                    .fail_task(
                        task.task_id,
                        truncate_chars(&result.output, STORED_ERROR_CHARS),
                        attempt + 1,
                    )
                    .await?;
                error!(
                    "Task failed after {} attempt(s): {}",
                    attempt + 1,
                    task.goal
                );
                return Ok(result);
            }
            attempt += 1;
            warn!(
                "Task failed, retrying ({}/{}): {}",
                attempt, max_retries, task.goal
            );
            self.emit(
                task.session_id,
                EventKind::TaskRetry,
                Some(worker.id()),
                json!({ "taskId": task.task_id, "attempt": attempt }),
            )
            .await?;
        }
    }

    async fn stored_dependency_output(&self, task: &TaskRecord) -> Result<String> {
        let mut outputs = Vec::new();
        for dep_id in &task.dependencies {
            let Some(dep) = self.store().get_task(dep_id).await? else {
                continue;
            };
            if dep.status != TaskStatus::Completed {
                continue;
            }
            if let Some(output) = dep.output() {
                outputs.push(output.to_string());
            }
        }
        Ok(outputs.join(DEPENDENCY_SEPARATOR))
    }

    /// Completed iff nothing failed in this run and every task row of the
    /// session is completed; skipped tasks count as failed.
    async fn finalize(
        &self,
        session_id: &str,
        results: Vec<TaskOutcome>,
        tasks_skipped: usize,
        total_tasks: usize,
    ) -> Result<OrchestrationSummary> {
        let tasks_completed = results.iter().filter(|r| r.success).count();
        let tasks_failed = results.len() - tasks_completed;
        let unfinished = self
            .store()
            .list_tasks(session_id)
            .await?
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .count();
        if tasks_failed == 0 && unfinished > 0 {
            warn!(
                "Session {} still has {} unfinished task(s) from an earlier run",
                session_id, unfinished
            );
        }
        let success = tasks_failed == 0 && unfinished == 0;
        let status = if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        self.store()
            .update_session(session_id, SessionUpdate::status(status))
            .await?;
        info!(
            "Session {} {}: {} completed, {} failed",
            session_id, status, tasks_completed, tasks_failed
        );

        Ok(OrchestrationSummary {
            session_id: session_id.to_string(),
            success,
            tasks_completed,
            tasks_failed,
            tasks_skipped,
            total_tasks,
            results,
        })
    }

    async fn record_progress(
        &self,
        session_id: &str,
        goal: &str,
        progress: &[(String, String, TaskStatus)],
        total: usize,
    ) -> Result<()> {
        let summary = progress_summary(goal, progress, total);
        self.store()
            .update_session(
                session_id,
                SessionUpdate {
                    context_summary: Some(summary),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn emit(
        &self,
        session_id: &str,
        kind: EventKind,
        agent_id: Option<&str>,
        data: Value,
    ) -> Result<()> {
        self.store()
            .append_event(session_id, kind.as_str(), agent_id, &data, None)
            .await?;
        Ok(())
    }
}

fn outcome(task_id: &str, agent: &str, goal: &str, success: bool, output: &str) -> TaskOutcome {
    TaskOutcome {
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        goal: goal.to_string(),
        success,
        output: truncate_chars(output, OUTCOME_OUTPUT_CHARS).to_string(),
    }
}

/// Working-layer text shown to later workers of the same session.
pub(crate) fn progress_summary(
    goal: &str,
    progress: &[(String, String, TaskStatus)],
    total: usize,
) -> String {
    let done = progress
        .iter()
        .filter(|(_, _, status)| *status == TaskStatus::Completed)
        .count();
    let mut lines = vec![
        format!("Goal: {}", goal),
        format!("Progress: {}/{} tasks completed", done, total),
    ];
    for (role, task_goal, status) in progress {
        let mark = if *status == TaskStatus::Completed { "x" } else { " " };
        let line = format!("- [{}] {}: {}", mark, role, truncate_chars(task_goal, 80));
        if *status == TaskStatus::Completed {
            lines.push(line);
        } else {
            lines.push(format!("{} ({})", line, status));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_summary_marks_each_task() {
        let progress = vec![
            ("database".to_string(), "create schema".to_string(), TaskStatus::Completed),
            ("backend".to_string(), "add endpoints".to_string(), TaskStatus::Failed),
            ("qa".to_string(), "write tests".to_string(), TaskStatus::Skipped),
        ];
        assert_eq!(
            progress_summary("todo app", &progress, 4),
            "Goal: todo app\n\
             Progress: 1/4 tasks completed\n\
             - [x] database: create schema\n\
             - [ ] backend: add endpoints (failed)\n\
             - [ ] qa: write tests (skipped)"
        );
    }

    #[test]
    fn outcome_output_is_capped() {
        let long = "z".repeat(900);
        let o = outcome("t", "qa-agent", "g", true, &long);
        assert_eq!(o.output.len(), OUTCOME_OUTPUT_CHARS);
    }
}
