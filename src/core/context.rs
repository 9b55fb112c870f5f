//! Token-budgeted prompt context for a worker.
//!
//! Four layers, most to least volatile:
//! - immediate: the latest events of the session, oldest first
//! - working: the session's progress summary (or its goal)
//! - project: session metadata, or the project path
//! - historical: the latest checkpoints, newest first

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::orchestrator::OrchestratorError;
use crate::core::store::Store;
use crate::core::text::truncate_chars;

pub const IMMEDIATE_EVENTS: usize = 5;
pub const HISTORICAL_CHECKPOINTS: usize = 3;
pub const DEFAULT_TOKEN_BUDGET: usize = 8000;

const CHARS_PER_TOKEN: usize = 4;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextCheckpoint {
    pub name: String,
    pub snapshot: Option<Value>,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentContext {
    pub immediate: Vec<ContextEvent>,
    pub working: String,
    pub project: String,
    pub historical: Vec<ContextCheckpoint>,
}

pub async fn build_context(store: &Store, session_id: &str) -> Result<AgentContext> {
    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

    let immediate = store
        .recent_events(session_id, IMMEDIATE_EVENTS)
        .await?
        .into_iter()
        .map(|event| ContextEvent {
            event_type: event.event_type,
            data: event.data,
            at: event.timestamp,
        })
        .collect();

    let working = session
        .context_summary
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| format!("Goal: {}", session.goal));

    let project = session
        .metadata
        .unwrap_or_else(|| json!({ "path": session.project_path }).to_string());

    let historical = store
        .list_checkpoints(session_id, HISTORICAL_CHECKPOINTS)
        .await?
        .into_iter()
        .map(|cp| ContextCheckpoint {
            name: cp.name,
            snapshot: cp.context_snapshot,
            at: cp.created_at,
        })
        .collect();

    Ok(AgentContext {
        immediate,
        working,
        project,
        historical,
    })
}

/// `ceil(serialized length / 4)`.
pub fn estimate_tokens(ctx: &AgentContext) -> usize {
    let len = serde_json::to_string(ctx)
        .map(|s| s.chars().count())
        .unwrap_or(0);
    len.div_ceil(CHARS_PER_TOKEN)
}

/// Shrinks `ctx` until it fits `budget`: drop the oldest checkpoints, then
/// truncate the working layer once, then drop the oldest events while more
/// than one remains. The result may still exceed the budget.
pub fn trim_context_to_fit(mut ctx: AgentContext, budget: usize) -> AgentContext {
    if estimate_tokens(&ctx) <= budget {
        return ctx;
    }

    while estimate_tokens(&ctx) > budget && ctx.historical.pop().is_some() {}

    if estimate_tokens(&ctx) > budget {
        let max_chars = budget * 3 / 10 * CHARS_PER_TOKEN;
        if ctx.working.chars().count() > max_chars {
            ctx.working = format!("{}{}", truncate_chars(&ctx.working, max_chars), ELLIPSIS);
        }
    }

    while estimate_tokens(&ctx) > budget && ctx.immediate.len() > 1 {
        ctx.immediate.remove(0);
    }

    ctx
}

/// Renders the context as the markdown block placed between a worker's
/// instructions and its task.
pub fn context_to_prompt(ctx: &AgentContext) -> String {
    let mut lines = vec!["## Current Session".to_string(), ctx.working.clone()];

    if !ctx.immediate.is_empty() {
        lines.push("\n## Recent Activity".to_string());
        for event in &ctx.immediate {
            lines.push(format!("- {}", json!(event)));
        }
    }

    if !ctx.project.is_empty() {
        lines.push("\n## Project Info".to_string());
        lines.push(ctx.project.clone());
    }

    if !ctx.historical.is_empty() {
        lines.push("\n## Previous Checkpoints".to_string());
        for cp in &ctx.historical {
            lines.push(format!("- {}", json!(cp)));
        }
    }

    lines.join("\n")
}
