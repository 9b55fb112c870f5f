//! Maps a planned task to a specialist.

use tracing::{debug, warn};

use crate::core::agent::{Specialist, WorkerRegistry};
use crate::core::text::truncate_chars;

const MIN_KEYWORD_CHARS: usize = 4;

/// Role keywords (and their short aliases) understood in plans.
fn role_alias(role: &str) -> Option<Specialist> {
    match role {
        "database" | "db" => Some(Specialist::Database),
        "backend" | "api" => Some(Specialist::Backend),
        "frontend" | "ui" => Some(Specialist::Frontend),
        "qa" | "test" => Some(Specialist::Qa),
        "devops" | "deploy" => Some(Specialist::Devops),
        _ => None,
    }
}

/// Role alias or exact worker id, restricted to registered workers.
pub fn match_by_role(registry: &WorkerRegistry, role: &str) -> Option<Specialist> {
    let role = role.trim().to_lowercase();
    match role_alias(&role) {
        Some(worker) => registry.get(worker.id()),
        None => registry.get(&role),
    }
}

/// Scores each worker by how many of its capability tags contain a goal
/// keyword (lower-cased whitespace tokens of 4+ chars). The strictly highest
/// score wins, so ties go to the earliest registration. A zero score never
/// matches.
pub fn match_by_capability(registry: &WorkerRegistry, goal: &str) -> Option<Specialist> {
    let goal = goal.to_lowercase();
    let keywords: Vec<&str> = goal
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS)
        .collect();
    if keywords.is_empty() {
        return None;
    }

    let mut best: Option<(Specialist, usize)> = None;
    for worker in registry.iter() {
        let score = worker
            .capabilities()
            .iter()
            .filter(|tag| keywords.iter().any(|k| tag.contains(k)))
            .count();
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((worker, score));
        }
    }
    best.map(|(worker, _)| worker)
}

/// Role first, then capability overlap, then the first registered worker.
/// `None` only when the registry is empty.
pub fn route_task(registry: &WorkerRegistry, role: &str, goal: &str) -> Option<Specialist> {
    let preview = truncate_chars(goal, 40);
    if let Some(worker) = match_by_role(registry, role) {
        debug!("Routed \"{}\" to {} (by role)", preview, worker.name());
        return Some(worker);
    }
    if let Some(worker) = match_by_capability(registry, goal) {
        debug!("Routed \"{}\" to {} (by capability)", preview, worker.name());
        return Some(worker);
    }
    let fallback = registry.first()?;
    warn!(
        "No matching agent for \"{}\" (role '{}'), using {}",
        preview,
        role,
        fallback.name()
    );
    Some(fallback)
}
