mod doctor;
mod session;

use anyhow::Result;
use console::style;

use crate::core::config::SwarmConfig;
use crate::core::orchestrator::SessionStatus;
use crate::core::store::Store;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Sessions")
        .command("start <goal>", "Decompose a goal and run it with the specialist team")
        .command("resume <id>", "Re-run pending and failed tasks of a session")
        .command("status", "Show the active session and its tasks")
        .command("list", "List sessions, newest first")
        .command("show <id>", "Show a session's tasks, checkpoints and recent events")
        .command("checkpoint <name>", "Save a manual checkpoint on the active session")
        .print();

    GuideSection::new("Diagnostics")
        .command("agents", "List registered specialists and their status")
        .command("doctor", "Check data directory, config and backend")
        .print();

    GuideSection::new("Options")
        .text("start   --path, -p <dir>      Project directory (default: current)")
        .text("list    --status, -s <status> active | paused | completed | failed")
        .text("show    --type, -t <event>    Only events of this type, e.g. task.retry")
        .text("show    --after, -a <seq>     Events after this sequence number")
        .blank()
        .text("Session ids may be abbreviated to any unique prefix.")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("swarm").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartArgs {
    pub goal: String,
    pub path: Option<String>,
}

/// Every non-flag word after `start` is part of the goal, so quoting is
/// optional.
pub(crate) fn parse_start_args(args: &[String], start: usize) -> StartArgs {
    let mut words: Vec<&str> = Vec::new();
    let mut path = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--path" | "-p" => {
                if i + 1 < args.len() {
                    path = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            word => {
                words.push(word);
                i += 1;
            }
        }
    }
    StartArgs {
        goal: words.join(" ").trim().to_string(),
        path,
    }
}

pub(crate) fn parse_list_args(
    args: &[String],
    start: usize,
) -> std::result::Result<Option<SessionStatus>, String> {
    let mut status = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--status" | "-s" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--status needs a value".to_string());
                };
                status = Some(
                    SessionStatus::from_status(&value.to_lowercase())
                        .ok_or_else(|| format!("Unknown session status '{}'", value))?,
                );
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(status)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ShowArgs {
    pub prefix: String,
    pub event_type: Option<String>,
    pub after: Option<i64>,
}

pub(crate) fn parse_show_args(
    args: &[String],
    start: usize,
) -> std::result::Result<ShowArgs, String> {
    let mut parsed = ShowArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--type" | "-t" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--type needs a value".to_string());
                };
                parsed.event_type = Some(value.clone());
                i += 2;
            }
            "--after" | "-a" => {
                let after = args
                    .get(i + 1)
                    .and_then(|v| v.parse::<i64>().ok())
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| "--after needs a sequence number".to_string())?;
                parsed.after = Some(after);
                i += 2;
            }
            word => {
                if parsed.prefix.is_empty() {
                    parsed.prefix = word.to_string();
                }
                i += 1;
            }
        }
    }
    Ok(parsed)
}

/// Remaining words joined with spaces; empty when absent.
pub(crate) fn rest_of_args(args: &[String], start: usize) -> String {
    args.get(start..)
        .map(|rest| rest.join(" "))
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let data_dir = NativePlatform::data_dir();
    tokio::fs::create_dir_all(&data_dir).await?;
    NativePlatform::restrict_dir_permissions(&data_dir);
    let config = SwarmConfig::load(&data_dir).await;
    crate::logging::init_logging(config.tracing_level(), &data_dir);

    let store = Store::open(&data_dir).await?;
    let result = dispatch(cmd, &args, &store, &config, &data_dir).await;
    let closed = store.close().await;
    result?;
    closed
}

async fn dispatch(
    cmd: &str,
    args: &[String],
    store: &Store,
    config: &SwarmConfig,
    data_dir: &std::path::Path,
) -> Result<()> {
    match cmd {
        "start" => session::start(args, store, config).await,
        "resume" => session::resume(args, store, config).await,
        "status" => session::status(store).await,
        "list" => match parse_list_args(args, 2) {
            Ok(status) => session::list(store, status).await,
            Err(msg) => {
                print_error(&msg);
                Ok(())
            }
        },
        "show" => match parse_show_args(args, 2) {
            Ok(parsed) => session::show(&parsed, store).await,
            Err(msg) => {
                print_error(&msg);
                Ok(())
            }
        },
        "checkpoint" => session::checkpoint(args, store).await,
        "agents" => doctor::agents(store).await,
        "doctor" => doctor::run_doctor(store, config, data_dir).await,
        other => {
            print_error(&format!("Unknown command '{}'.", other));
            print_help();
            Ok(())
        }
    }
}
