use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use super::{ShowArgs, parse_start_args, rest_of_args};
use crate::core::agent::WorkerRegistry;
use crate::core::backend::{Backend, ClaudeCli};
use crate::core::config::SwarmConfig;
use crate::core::orchestrator::{OrchestrationSummary, Orchestrator, SessionStatus, TaskStatus};
use crate::core::store::{EventQuery, Store, WorkSession, now_millis};
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_step, print_success, print_warn,
};
use crate::core::text::truncate_chars;

const SHORT_ID: usize = 8;
const SHOW_EVENTS: usize = 20;
const SHOW_CHECKPOINTS: usize = 5;
const MANUAL_AGENT: &str = "manual";

fn short_id(id: &str) -> &str {
    truncate_chars(id, SHORT_ID)
}

fn format_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Builds the engine around the configured backend, or `None` (after
/// telling the user) when the backend does not answer.
async fn ready_orchestrator(store: &Store, config: &SwarmConfig) -> Result<Option<Orchestrator>> {
    let backend = Arc::new(ClaudeCli::from_config(config));
    print_step("Checking backend...");
    if !backend.is_available().await {
        print_error(&format!(
            "Backend '{}' is not available. Install it or set backend_command in config.toml.",
            config.backend_command
        ));
        return Ok(None);
    }
    let orchestrator = Orchestrator::new(
        store.clone(),
        backend,
        WorkerRegistry::with_defaults(),
        config.orchestrator_settings(),
    )
    .await?;
    Ok(Some(orchestrator))
}

/// Pauses whatever session was in flight when Ctrl-C arrived.
async fn pause_interrupted(orchestrator: &Orchestrator) -> Result<()> {
    print_warn("Interrupted. Pausing the session...");
    match orchestrator.store().get_active_session().await? {
        Some(session) => {
            let reset = orchestrator.pause_session(&session.id).await?;
            print_info(&format!(
                "Session {} paused, {} task(s) requeued. Continue with: swarm resume {}",
                short_id(&session.id),
                reset,
                short_id(&session.id)
            ));
        }
        None => print_info("No session was in flight."),
    }
    Ok(())
}

fn print_summary(summary: &OrchestrationSummary) {
    let mut section = GuideSection::new("Session Summary")
        .status("Session", &summary.session_id)
        .status(
            "Result",
            if summary.success { "completed" } else { "failed" },
        )
        .status(
            "Tasks",
            &format!(
                "{}/{} completed, {} failed ({} skipped)",
                summary.tasks_completed,
                summary.total_tasks,
                summary.tasks_failed,
                summary.tasks_skipped
            ),
        )
        .blank();
    for result in &summary.results {
        let line = format!("[{}] {}", result.agent, result.goal);
        section = if result.success {
            section.success(&line)
        } else {
            section.warn(&format!("{}: {}", line, truncate_chars(&result.output, 120)))
        };
    }
    section.print();
    println!();
}

pub async fn start(args: &[String], store: &Store, config: &SwarmConfig) -> Result<()> {
    let parsed = parse_start_args(args, 2);
    if parsed.goal.is_empty() {
        print_error("Usage: swarm start <goal> [--path <dir>]");
        return Ok(());
    }
    let project_path = match parsed.path {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    if !project_path.is_dir() {
        bail!("project path {:?} is not a directory", project_path);
    }

    let Some(orchestrator) = ready_orchestrator(store, config).await? else {
        return Ok(());
    };
    print_step(&format!("Starting swarm: {}", parsed.goal));
    tokio::select! {
        summary = orchestrator.orchestrate(&parsed.goal, &project_path) => print_summary(&summary?),
        _ = tokio::signal::ctrl_c() => pause_interrupted(&orchestrator).await?,
    }
    Ok(())
}

pub async fn resume(args: &[String], store: &Store, config: &SwarmConfig) -> Result<()> {
    let prefix = rest_of_args(args, 2);
    if prefix.is_empty() {
        print_error("Usage: swarm resume <session-id>");
        return Ok(());
    }
    let Some(session) = store.find_session_by_prefix(&prefix).await? else {
        print_error(&format!("No session matches '{}'.", prefix));
        return Ok(());
    };

    let Some(orchestrator) = ready_orchestrator(store, config).await? else {
        return Ok(());
    };
    print_step(&format!("Resuming session {}: {}", short_id(&session.id), session.name));
    tokio::select! {
        summary = orchestrator.resume_session(&session.id) => print_summary(&summary?),
        _ = tokio::signal::ctrl_c() => pause_interrupted(&orchestrator).await?,
    }
    Ok(())
}

async fn print_session(store: &Store, session: &WorkSession) -> Result<()> {
    let mut section = GuideSection::new(&format!("Session {}", short_id(&session.id)))
        .status("Name", &session.name)
        .status("Goal", &session.goal)
        .status("Project", &session.project_path)
        .status("Status", session.status.as_str())
        .status("Started", &format_time(session.started_at));
    if let Some(done) = session.completed_at {
        section = section.status("Finished", &format_time(done));
    }
    if let Some(cp) = store.latest_checkpoint(&session.id, None).await? {
        section = section.status(
            "Last checkpoint",
            &format!("#{} {} ({})", cp.sequence, cp.name, format_time(cp.created_at)),
        );
    }
    let tasks = store.list_tasks(&session.id).await?;
    if !tasks.is_empty() {
        section = section.blank();
    }
    for task in &tasks {
        let line = format!("[{}] {}: {}", task.status, task.task_type, task.input.goal);
        section = match &task.error_message {
            Some(err) if task.status != TaskStatus::Completed => {
                section.warn(&format!("{} ({})", line, truncate_chars(err, 80)))
            }
            _ => section.text(&line),
        };
    }
    section.print();
    Ok(())
}

pub async fn status(store: &Store) -> Result<()> {
    match store.get_active_session().await? {
        Some(session) => {
            print_session(store, &session).await?;
            println!();
        }
        None => print_info("No active session. Start one with: swarm start <goal>"),
    }
    Ok(())
}

pub async fn list(store: &Store, status: Option<SessionStatus>) -> Result<()> {
    let sessions = store.list_sessions(status).await?;
    if sessions.is_empty() {
        print_info("No sessions found.");
        return Ok(());
    }
    let mut section = GuideSection::new("Sessions");
    for session in &sessions {
        section = section.text(&format!(
            "{}  {:<9}  {}  {}",
            short_id(&session.id),
            session.status.as_str(),
            format_time(session.updated_at),
            session.name
        ));
    }
    section.print();
    println!();
    Ok(())
}

/// Events window of `show`: the newest ones by default, or a page after
/// `--after`, optionally restricted to one event type.
fn events_query(parsed: &ShowArgs, total: i64) -> EventQuery {
    let after_seq = match (parsed.after, &parsed.event_type) {
        (Some(after), _) => after,
        (None, Some(_)) => 0,
        (None, None) => (total - SHOW_EVENTS as i64).max(0),
    };
    EventQuery {
        event_type: parsed.event_type.clone(),
        after_seq: Some(after_seq),
        limit: Some(SHOW_EVENTS),
    }
}

pub async fn show(parsed: &ShowArgs, store: &Store) -> Result<()> {
    if parsed.prefix.is_empty() {
        print_error("Usage: swarm show <session-id> [--type <event>] [--after <seq>]");
        return Ok(());
    }
    let Some(session) = store.find_session_by_prefix(&parsed.prefix).await? else {
        print_error(&format!("No session matches '{}'.", parsed.prefix));
        return Ok(());
    };
    print_session(store, &session).await?;

    let checkpoints = store.list_checkpoints(&session.id, SHOW_CHECKPOINTS).await?;
    if !checkpoints.is_empty() {
        let mut section = GuideSection::new("Checkpoints");
        for cp in &checkpoints {
            section = section.text(&format!(
                "#{} {}  {}  ({})",
                cp.sequence,
                format_time(cp.created_at),
                cp.name,
                cp.agent_id
            ));
        }
        section.print();
    }

    let total = store.count_events(&session.id).await?;
    let events = store
        .list_events(&session.id, &events_query(parsed, total))
        .await?;
    let mut section = GuideSection::new(&format!("Events ({} of {})", events.len(), total));
    for event in &events {
        section = section.text(&format!(
            "#{:<4} {}  {:<22} {}",
            event.sequence,
            format_time(event.timestamp),
            event.event_type,
            event.agent_id.as_deref().unwrap_or("")
        ));
    }
    if let Some(last) = events.last().filter(|_| events.len() == SHOW_EVENTS) {
        section = section.blank().text(&format!(
            "More: swarm show {} --after {}",
            short_id(&session.id),
            last.sequence
        ));
    }
    section.print();
    println!();
    Ok(())
}

pub async fn checkpoint(args: &[String], store: &Store) -> Result<()> {
    let name = rest_of_args(args, 2);
    if name.is_empty() {
        print_error("Usage: swarm checkpoint <name>");
        return Ok(());
    }
    let Some(session) = store.get_active_session().await? else {
        print_error("No active session to checkpoint.");
        return Ok(());
    };
    let cp = store
        .save_checkpoint(
            &session.id,
            MANUAL_AGENT,
            &name,
            &json!({ "manual": true, "timestamp": now_millis() }),
            None,
        )
        .await?;
    print_success(&format!(
        "Checkpoint #{} '{}' saved on session {}.",
        cp.sequence,
        cp.name,
        short_id(&session.id)
    ));
    let parent = match &cp.parent_id {
        Some(parent_id) => store.load_checkpoint(parent_id).await?,
        None => None,
    };
    if let Some(parent) = parent {
        print_info(&format!(
            "Follows manual checkpoint #{} '{}' from {}.",
            parent.sequence,
            parent.name,
            format_time(parent.created_at)
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_keeps_eight_chars() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    fn show_args(event_type: Option<&str>, after: Option<i64>) -> ShowArgs {
        ShowArgs {
            prefix: "abc".into(),
            event_type: event_type.map(str::to_string),
            after,
        }
    }

    #[test]
    fn default_events_window_is_the_newest_page() {
        assert_eq!(events_query(&show_args(None, None), 45).after_seq, Some(25));
        assert_eq!(events_query(&show_args(None, None), 7).after_seq, Some(0));
    }

    #[test]
    fn filtered_or_paged_events_start_where_asked() {
        let typed = events_query(&show_args(Some("task.retry"), None), 45);
        assert_eq!(typed.after_seq, Some(0));
        assert_eq!(typed.event_type.as_deref(), Some("task.retry"));
        let paged = events_query(&show_args(None, Some(20)), 45);
        assert_eq!((paged.after_seq, paged.limit), (Some(20), Some(SHOW_EVENTS)));
    }

    #[tokio::test]
    async fn newest_window_lists_the_tail_of_the_log() {
        let store = crate::core::store::test_store();
        let session = store.create_session("goal", "/p").await.unwrap();
        for i in 0..25 {
            store
                .append_event(&session.id, "tick", None, &json!({ "i": i }), None)
                .await
                .unwrap();
        }
        let total = store.count_events(&session.id).await.unwrap();
        let events = store
            .list_events(&session.id, &events_query(&show_args(None, None), total))
            .await
            .unwrap();
        assert_eq!(events.len(), SHOW_EVENTS);
        assert_eq!(events.first().map(|e| e.sequence), Some(6));
        assert_eq!(events.last().map(|e| e.sequence), Some(25));
    }

    #[test]
    fn invalid_timestamp_renders_dash() {
        assert_eq!(format_time(i64::MAX), "-");
        assert_eq!(format_time(0).len(), 19);
    }
}
