mod decomposer;
mod engine;
pub mod router;
pub mod types;

pub use decomposer::decompose_goal;
pub use engine::Orchestrator;
pub use router::route_task;
pub use types::{
    DecomposedTask, EventKind, OrchestrationSummary, OrchestratorError, OrchestratorSettings,
    SessionStatus, TaskOutcome, TaskStatus,
};

/// Session lifecycle: `active` may finish or pause; `paused` and `failed`
/// sessions can be resumed; `completed` is final.
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    if from == to {
        return true;
    }
    match from {
        SessionStatus::Active => matches!(
            to,
            SessionStatus::Paused | SessionStatus::Completed | SessionStatus::Failed
        ),
        SessionStatus::Paused | SessionStatus::Failed => matches!(to, SessionStatus::Active),
        SessionStatus::Completed => false,
    }
}

#[cfg(test)]
mod tests;
