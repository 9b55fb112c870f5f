use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{engine, engine_with, planned_backend};
use crate::core::agent::WorkerRegistry;
use crate::core::backend::mock::{ScriptedBackend, fail, ok};
use crate::core::orchestrator::{OrchestratorSettings, SessionStatus, TaskStatus};
use crate::core::store::{EventQuery, test_store};

fn chain_plan() -> serde_json::Value {
    json!([
        { "role": "database", "goal": "create todos table", "priority": 1, "dependencies": [] },
        { "role": "backend", "goal": "add todo endpoints", "priority": 2, "dependencies": [0] },
        { "role": "qa", "goal": "test todo endpoints", "priority": 3, "dependencies": [1] }
    ])
}

#[tokio::test]
async fn happy_path_completes_every_task_in_order() {
    let backend = planned_backend(chain_plan(), |goal| ok(&format!("done: {}", goal)));
    let orchestrator = engine(backend.clone()).await;
    let summary = orchestrator
        .orchestrate("build a todo api", Path::new("/work/todo"))
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.total_tasks, 3);
    assert_eq!(summary.tasks_completed, 3);
    assert_eq!(summary.tasks_failed, 0);
    let agents: Vec<&str> = summary.results.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(agents, vec!["database-agent", "backend-agent", "qa-agent"]);
    assert_eq!(summary.results[1].output, "done: add todo endpoints");

    let store = orchestrator.store();
    let session = store.get_session(&summary.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());
    assert_eq!(session.project_path, "/work/todo");
    let working = session.context_summary.unwrap();
    assert!(working.contains("Progress: 3/3 tasks completed"));
    assert!(working.contains("- [x] qa: test todo endpoints"));

    let tasks = store.list_tasks(&summary.session_id).await.unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert_eq!(tasks[0].output(), Some("done: create todos table"));
    assert_eq!(tasks[1].dependencies, vec![tasks[0].id.clone()]);
    assert_eq!(tasks[1].assigned_agent.as_deref(), Some("backend-agent"));
    assert_eq!(tasks[1].retry_count, 0);

    // Each step sees the previous step's output.
    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[2].ends_with("## Previous Step Output\ndone: create todos table"));
    assert!(prompts[3].ends_with("## Previous Step Output\ndone: add todo endpoints"));
}

#[tokio::test]
async fn event_log_records_the_run_without_gaps() {
    let backend = planned_backend(chain_plan(), |_| ok("ok"));
    let orchestrator = engine(backend).await;
    let summary = orchestrator
        .orchestrate("build a todo api", Path::new("/work/todo"))
        .await
        .unwrap();

    let events = orchestrator
        .store()
        .list_events(&summary.session_id, &EventQuery::default())
        .await
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "session.started",
            "tasks.decomposed",
            "agent.task_started",
            "agent.task_completed",
            "agent.task_started",
            "agent.task_completed",
            "agent.task_started",
            "agent.task_completed",
            "session.completed",
        ]
    );
    let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=9).collect::<Vec<i64>>());
    assert_eq!(events[0].data["projectPath"], "/work/todo");
    assert_eq!(events[1].data["tasks"][2], json!({ "role": "qa", "goal": "test todo endpoints" }));
    assert_eq!(events[8].data["tasksCompleted"], 3);
}

#[tokio::test]
async fn failed_first_step_skips_its_dependents() {
    let backend = planned_backend(chain_plan(), |_| fail("migration error"));
    let orchestrator = engine(backend.clone()).await;
    let summary = orchestrator
        .orchestrate("build a todo api", Path::new("/work/todo"))
        .await
        .unwrap();

    assert!(!summary.success);
    assert_eq!(summary.total_tasks, 3);
    assert_eq!(summary.tasks_completed, 0);
    assert_eq!(summary.tasks_failed, 3);
    assert_eq!(summary.tasks_skipped, 2);
    assert_eq!(summary.results[1].output, "Dependency not met");
    assert_eq!(summary.results[1].agent, "none");

    let store = orchestrator.store();
    let statuses: Vec<TaskStatus> = store
        .list_tasks(&summary.session_id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.status)
        .collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Failed, TaskStatus::Skipped, TaskStatus::Skipped]
    );
    let session = store.get_session(&summary.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);

    // Decomposition plus four attempts of the first task.
    assert_eq!(backend.prompts().len(), 5);
    let retries = store
        .list_events(
            &summary.session_id,
            &EventQuery {
                event_type: Some("task.retry".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let attempts: Vec<i64> = retries
        .iter()
        .map(|e| e.data["attempt"].as_i64().unwrap())
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn flaky_task_succeeds_on_second_attempt() {
    let calls = AtomicUsize::new(0);
    let backend = planned_backend(
        json!([{ "role": "backend", "goal": "add login route" }]),
        move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                fail("flaky")
            } else {
                ok("fixed")
            }
        },
    );
    let orchestrator = engine(backend).await;
    let summary = orchestrator
        .orchestrate("add auth", Path::new("/work/auth"))
        .await
        .unwrap();
    assert!(summary.success);

    let store = orchestrator.store();
    let retries = store
        .list_events(
            &summary.session_id,
            &EventQuery {
                event_type: Some("task.retry".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].data["attempt"], 1);
    assert_eq!(retries[0].agent_id.as_deref(), Some("backend-agent"));

    let task = &store.list_tasks(&summary.session_id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output(), Some("fixed"));
    assert_eq!(task.error_message, None);
    assert_eq!(task.retry_count, 1);
}

#[tokio::test]
async fn exhausted_retries_store_truncated_error_and_attempt_count() {
    let backend = planned_backend(
        json!([{ "role": "qa", "goal": "run the suite" }]),
        |_| fail(&"e".repeat(3000)),
    );
    let orchestrator = engine_with(
        test_store(),
        backend,
        WorkerRegistry::with_defaults(),
        OrchestratorSettings {
            max_retries: 1,
            ..Default::default()
        },
    )
    .await;
    let summary = orchestrator
        .orchestrate("verify", Path::new("/work"))
        .await
        .unwrap();

    assert_eq!(summary.results[0].output.len(), 500);
    let task = &orchestrator.store().list_tasks(&summary.session_id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.max_retries, 1);
    assert_eq!(task.error_message.as_ref().map(|e| e.len()), Some(1000));
}

#[tokio::test]
async fn empty_registry_fails_tasks_without_a_worker() {
    let backend = planned_backend(json!([{ "role": "backend", "goal": "add api" }]), |_| ok("ok"));
    let orchestrator = engine_with(
        test_store(),
        backend,
        WorkerRegistry::new(),
        OrchestratorSettings::default(),
    )
    .await;
    let summary = orchestrator
        .orchestrate("add api", Path::new("/work"))
        .await
        .unwrap();

    assert!(!summary.success);
    assert_eq!(summary.results[0].agent, "none");
    assert_eq!(summary.results[0].output, "No agent available");
    let task = &orchestrator.store().list_tasks(&summary.session_id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("No agent available"));
}

#[tokio::test]
async fn unparseable_plan_runs_goal_as_single_backend_task() {
    let backend = std::sync::Arc::new(ScriptedBackend::new(|prompt| {
        if prompt.contains("task decomposition engine") {
            ok("nonsense")
        } else {
            ok("built it")
        }
    }));
    let orchestrator = engine(backend).await;
    let summary = orchestrator
        .orchestrate("build a todo app", Path::new("/work"))
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.total_tasks, 1);
    assert_eq!(summary.results[0].agent, "backend-agent");
    assert_eq!(summary.results[0].goal, "build a todo app");
}

#[tokio::test]
async fn out_of_range_dependency_skips_and_is_not_persisted() {
    let backend = planned_backend(
        json!([{ "role": "backend", "goal": "add api", "dependencies": [5] }]),
        |_| ok("ok"),
    );
    let orchestrator = engine(backend).await;
    let summary = orchestrator
        .orchestrate("add api", Path::new("/work"))
        .await
        .unwrap();

    assert_eq!(summary.tasks_skipped, 1);
    let task = &orchestrator.store().list_tasks(&summary.session_id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Skipped);
    assert!(task.dependencies.is_empty());
}

#[tokio::test]
async fn final_checkpoint_summarizes_outcomes() {
    let backend = planned_backend(
        json!([
            { "role": "database", "goal": "create schema" },
            { "role": "frontend", "goal": "build list view" }
        ]),
        |goal| if goal == "build list view" { fail("no") } else { ok("yes") },
    );
    let orchestrator = engine_with(
        test_store(),
        backend,
        WorkerRegistry::with_defaults(),
        OrchestratorSettings {
            max_retries: 0,
            ..Default::default()
        },
    )
    .await;
    let summary = orchestrator
        .orchestrate("todo ui", Path::new("/work"))
        .await
        .unwrap();
    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.tasks_failed, 1);
    assert_eq!(summary.tasks_skipped, 0);

    let checkpoint = orchestrator
        .store()
        .latest_checkpoint(&summary.session_id, Some("orchestrator"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.name, "Session complete");
    assert_eq!(
        checkpoint.state,
        json!({
            "tasksCompleted": 1,
            "tasksFailed": 1,
            "results": [
                { "agent": "database-agent", "goal": "create schema", "success": true },
                { "agent": "frontend-agent", "goal": "build list view", "success": false }
            ]
        })
    );
}

#[tokio::test]
async fn workers_are_idle_after_the_run() {
    let backend = planned_backend(chain_plan(), |_| ok("ok"));
    let orchestrator = engine(backend).await;
    orchestrator
        .orchestrate("build a todo api", Path::new("/work"))
        .await
        .unwrap();
    let agents = orchestrator.store().list_agents().await.unwrap();
    assert_eq!(agents.len(), 5);
    assert!(agents.iter().all(|a| a.status == "idle"));
}
