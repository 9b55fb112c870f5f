use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use super::Specialist;
use crate::core::backend::Backend;
use crate::core::context::{build_context, context_to_prompt, trim_context_to_fit};
use crate::core::orchestrator::EventKind;
use crate::core::store::{AgentStatus, Store};
use crate::core::text::truncate_chars;

const CHECKPOINT_GOAL_CHARS: usize = 40;
const CHECKPOINT_RESULT_CHARS: usize = 2000;
const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Shared collaborators every worker execution needs.
#[derive(Clone)]
pub struct WorkerEnv {
    pub store: Store,
    pub backend: Arc<dyn Backend>,
    pub token_budget: usize,
}

/// One unit of work handed to a specialist.
#[derive(Debug, Clone)]
pub struct WorkerTask<'a> {
    pub task_id: &'a str,
    pub session_id: &'a str,
    pub task_type: &'a str,
    pub goal: &'a str,
    pub constraints: &'a [String],
    pub dependencies_output: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
}

impl Specialist {
    /// Runs one task through the backend.
    ///
    /// Backend failures come back as an unsuccessful [`TaskResult`] whose
    /// output starts with `"Error: "`; only storage failures are returned as
    /// `Err`.
    pub async fn execute(
        self,
        env: &WorkerEnv,
        task: &WorkerTask<'_>,
        project_path: &Path,
    ) -> Result<TaskResult> {
        info!("[{}] Starting task: {}", self.name(), task.goal);
        let store = &env.store;
        store
            .set_agent_status(self.id(), AgentStatus::Busy, Some(task.session_id))
            .await?;
        store
            .append_event(
                task.session_id,
                EventKind::AgentTaskStarted.as_str(),
                Some(self.id()),
                &json!({
                    "agentId": self.id(),
                    "agentName": self.name(),
                    "taskId": task.task_id,
                    "goal": task.goal,
                }),
                None,
            )
            .await?;

        let context = build_context(store, task.session_id).await?;
        let context = trim_context_to_fit(context, env.token_budget);
        let prompt = self.build_prompt(&context_to_prompt(&context), task);

        let result = match env.backend.run(&prompt, project_path).await {
            Ok(run) => {
                let result = TaskResult {
                    success: run.success(),
                    output: run.output,
                };
                store
                    .save_checkpoint(
                        task.session_id,
                        self.id(),
                        &format!(
                            "{}: {}",
                            self.name(),
                            truncate_chars(task.goal, CHECKPOINT_GOAL_CHARS)
                        ),
                        &json!({
                            "taskId": task.task_id,
                            "goal": task.goal,
                            "result": truncate_chars(&result.output, CHECKPOINT_RESULT_CHARS),
                            "success": result.success,
                        }),
                        Some(&json!({
                            "role": task.task_type,
                            "goal": task.goal,
                            "success": result.success,
                        })),
                    )
                    .await?;
                store
                    .append_event(
                        task.session_id,
                        EventKind::AgentTaskCompleted.as_str(),
                        Some(self.id()),
                        &json!({
                            "agentId": self.id(),
                            "taskId": task.task_id,
                            "success": result.success,
                            "outputPreview": truncate_chars(&result.output, OUTPUT_PREVIEW_CHARS),
                        }),
                        None,
                    )
                    .await?;
                info!(
                    "[{}] Task finished: {}",
                    self.name(),
                    if result.success { "SUCCESS" } else { "FAILED" }
                );
                result
            }
            Err(e) => {
                error!("[{}] Task failed: {}", self.name(), e);
                store
                    .append_event(
                        task.session_id,
                        EventKind::AgentTaskFailed.as_str(),
                        Some(self.id()),
                        &json!({
                            "agentId": self.id(),
                            "taskId": task.task_id,
                            "error": e.to_string(),
                        }),
                        None,
                    )
                    .await?;
                TaskResult {
                    success: false,
                    output: format!("Error: {}", e),
                }
            }
        };

        store
            .set_agent_status(self.id(), AgentStatus::Idle, None)
            .await?;
        Ok(result)
    }

    fn build_prompt(self, context_prompt: &str, task: &WorkerTask<'_>) -> String {
        let mut parts = vec![
            self.instructions().to_string(),
            "\n---\n".to_string(),
            context_prompt.to_string(),
            "\n---\n".to_string(),
            format!("## Task\n{}", task.goal),
        ];
        if !task.constraints.is_empty() {
            let list: Vec<String> = task.constraints.iter().map(|c| format!("- {}", c)).collect();
            parts.push(format!("\n## Constraints\n{}", list.join("\n")));
        }
        if let Some(deps) = task.dependencies_output.filter(|d| !d.is_empty()) {
            parts.push(format!("\n## Previous Step Output\n{}", deps));
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendError;
    use crate::core::backend::mock::{ScriptedBackend, fail, ok};
    use crate::core::store::{EventQuery, test_store};

    async fn setup(backend: Arc<ScriptedBackend>) -> (WorkerEnv, String, String) {
        let store = test_store();
        crate::core::agent::WorkerRegistry::with_defaults()
            .persist(&store)
            .await
            .unwrap();
        let session = store.create_session("build a todo app", "/tmp").await.unwrap();
        let env = WorkerEnv {
            store,
            backend,
            token_budget: 8000,
        };
        (env, session.id, "task-1".to_string())
    }

    fn task<'a>(session_id: &'a str, task_id: &'a str, goal: &'a str) -> WorkerTask<'a> {
        WorkerTask {
            task_id,
            session_id,
            task_type: "backend",
            goal,
            constraints: &[],
            dependencies_output: None,
        }
    }

    #[tokio::test]
    async fn success_saves_checkpoint_and_events() {
        let (env, session_id, task_id) = setup(Arc::new(ScriptedBackend::new(|_| ok("wrote api.rs")))).await;
        let result = Specialist::Backend
            .execute(&env, &task(&session_id, &task_id, "Create REST endpoints for todos"), Path::new("/tmp"))
            .await
            .unwrap();
        assert_eq!(
            result,
            TaskResult {
                success: true,
                output: "wrote api.rs".into()
            }
        );

        let events = env
            .store
            .list_events(&session_id, &EventQuery::default())
            .await
            .unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["agent.task_started", "agent.task_completed"]);
        assert_eq!(events[1].data["outputPreview"], "wrote api.rs");
        assert_eq!(events[1].agent_id.as_deref(), Some("backend-agent"));

        let cp = env
            .store
            .latest_checkpoint(&session_id, Some("backend-agent"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.name, "Backend Agent: Create REST endpoints for todos");
        assert_eq!(cp.state["success"], true);
        assert_eq!(cp.state["result"], "wrote api.rs");

        let agents = env.store.list_agents().await.unwrap();
        let backend = agents.iter().find(|a| a.agent_id == "backend-agent").unwrap();
        assert_eq!(backend.status, "idle");
    }

    #[tokio::test]
    async fn non_zero_exit_is_unsuccessful_but_checkpointed() {
        let (env, session_id, task_id) = setup(Arc::new(ScriptedBackend::new(|_| fail("compile error")))).await;
        let result = Specialist::Qa
            .execute(&env, &task(&session_id, &task_id, "write tests"), Path::new("/tmp"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "compile error");
        let cp = env.store.latest_checkpoint(&session_id, None).await.unwrap().unwrap();
        assert_eq!(cp.state["success"], false);
    }

    #[tokio::test]
    async fn backend_error_becomes_failed_result() {
        let (env, session_id, task_id) = setup(Arc::new(ScriptedBackend::new(|_| {
            Err(BackendError::Timeout { ms: 300000 })
        })))
        .await;
        let result = Specialist::Devops
            .execute(&env, &task(&session_id, &task_id, "deploy"), Path::new("/tmp"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Error: backend timed out after 300000ms");

        let failed = env
            .store
            .list_events(
                &session_id,
                &EventQuery {
                    event_type: Some("agent.task_failed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].data["error"], "backend timed out after 300000ms");
        assert!(env.store.latest_checkpoint(&session_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prompt_layers_instructions_context_and_task() {
        let backend = Arc::new(ScriptedBackend::new(|_| ok("done")));
        let (env, session_id, task_id) = setup(backend.clone()).await;
        let constraints = vec!["use sqlite".to_string()];
        let input = WorkerTask {
            constraints: &constraints,
            dependencies_output: Some("schema.sql created"),
            ..task(&session_id, &task_id, "Create todo endpoints")
        };
        Specialist::Backend
            .execute(&env, &input, Path::new("/tmp"))
            .await
            .unwrap();

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.starts_with(Specialist::Backend.instructions()));
        assert!(prompt.contains("## Current Session\nGoal: build a todo app"));
        assert!(prompt.contains("## Task\nCreate todo endpoints"));
        assert!(prompt.contains("## Constraints\n- use sqlite"));
        assert!(prompt.ends_with("## Previous Step Output\nschema.sql created"));
        let task_pos = prompt.find("## Task").unwrap();
        let context_pos = prompt.find("## Current Session").unwrap();
        assert!(context_pos < task_pos);
    }
}
