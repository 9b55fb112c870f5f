use anyhow::Result;
use std::path::Path;

use crate::core::backend::{Backend, ClaudeCli};
use crate::core::config::{CONFIG_FILE, SwarmConfig};
use crate::core::store::{DB_FILE, Store};
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_status, print_step, print_success, print_warn,
};
use crate::logging::LOG_FILE;

/// Reports the environment the engine would run in. Returns `Ok` even when
/// checks fail; the findings are printed.
pub async fn run_doctor(store: &Store, config: &SwarmConfig, data_dir: &Path) -> Result<()> {
    print_step("Checking swarm environment...");
    println!();

    print_status("Data directory", &data_dir.display().to_string());
    print_status("Database", &data_dir.join(DB_FILE).display().to_string());
    print_status("Log file", &data_dir.join(LOG_FILE).display().to_string());
    if data_dir.join(CONFIG_FILE).exists() {
        print_status("Config", &data_dir.join(CONFIG_FILE).display().to_string());
    } else {
        config.save(data_dir).await?;
        print_info(&format!(
            "No {} found, wrote the defaults to {}.",
            CONFIG_FILE,
            data_dir.join(CONFIG_FILE).display()
        ));
    }
    print_status(
        "Settings",
        &format!(
            "max_retries={}, token_budget={}, timeout={}ms, log_level={}",
            config.max_retries, config.token_budget, config.backend_timeout_ms, config.log_level
        ),
    );

    let sessions = store.list_sessions(None).await?;
    print_success(&format!("Store is readable ({} session(s)).", sessions.len()));
    if let Some(active) = store.get_active_session().await? {
        print_warn(&format!(
            "Session {} is still marked active.",
            crate::core::text::truncate_chars(&active.id, 8)
        ));
    }

    print_step(&format!("Probing backend '{}'...", config.backend_command));
    let backend = ClaudeCli::from_config(config);
    if backend.is_available().await {
        print_success("Backend answered.");
    } else {
        print_error(&format!(
            "Backend '{}' did not answer. Check that it is installed and authenticated.",
            config.backend_command
        ));
    }
    Ok(())
}

pub async fn agents(store: &Store) -> Result<()> {
    let agents = store.list_agents().await?;
    if agents.is_empty() {
        print_info("No agents registered yet. They are registered on the first 'swarm start'.");
        return Ok(());
    }
    let mut section = GuideSection::new("Agents");
    for agent in &agents {
        let state = match &agent.current_session_id {
            Some(session) => format!(
                "{} (session {})",
                agent.status,
                crate::core::text::truncate_chars(session, 8)
            ),
            None => agent.status.clone(),
        };
        section = section
            .status(&agent.name, &state)
            .text(&format!("  {}", agent.capabilities.join(", ")));
    }
    section.print();
    println!();
    Ok(())
}
