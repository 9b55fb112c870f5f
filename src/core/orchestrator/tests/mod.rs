mod orchestration;

use serde_json::Value;
use std::sync::Arc;

use crate::core::agent::WorkerRegistry;
use crate::core::backend::mock::{ScriptedBackend, ok};
use crate::core::backend::{BackendError, BackendOutput};
use crate::core::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::core::store::{Store, test_store};

const DECOMPOSITION_MARKER: &str = "task decomposition engine";

/// Goal line of a worker prompt.
pub(super) fn task_goal(prompt: &str) -> &str {
    prompt
        .split_once("\n## Task\n")
        .and_then(|(_, rest)| rest.lines().next())
        .unwrap_or("")
}

/// Answers decomposition prompts with `plan` and worker prompts through
/// `worker`, which receives the task goal.
pub(super) fn planned_backend(
    plan: Value,
    worker: impl Fn(&str) -> Result<BackendOutput, BackendError> + Send + Sync + 'static,
) -> Arc<ScriptedBackend> {
    let plan = plan.to_string();
    Arc::new(ScriptedBackend::new(move |prompt| {
        if prompt.contains(DECOMPOSITION_MARKER) {
            ok(&plan)
        } else {
            worker(task_goal(prompt))
        }
    }))
}

pub(super) async fn engine_with(
    store: Store,
    backend: Arc<ScriptedBackend>,
    registry: WorkerRegistry,
    settings: OrchestratorSettings,
) -> Orchestrator {
    Orchestrator::new(store, backend, registry, settings)
        .await
        .unwrap()
}

pub(super) async fn engine(backend: Arc<ScriptedBackend>) -> Orchestrator {
    engine_with(
        test_store(),
        backend,
        WorkerRegistry::with_defaults(),
        OrchestratorSettings::default(),
    )
    .await
}
