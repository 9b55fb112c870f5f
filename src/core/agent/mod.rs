//! Specialist workers: a closed set of variants sharing one execution
//! contract (see [`worker`]).

mod profiles;
mod worker;

pub use worker::{TaskResult, WorkerEnv, WorkerTask};

use anyhow::Result;

use crate::core::store::Store;

/// Every registry row is a specialist; the coordinator itself never executes tasks.
pub const SPECIALIST_ROLE: &str = "specialist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specialist {
    Database,
    Backend,
    Frontend,
    Qa,
    Devops,
}

impl Specialist {
    /// Registration order of the default registry.
    pub const ALL: [Specialist; 5] = [
        Specialist::Database,
        Specialist::Backend,
        Specialist::Frontend,
        Specialist::Qa,
        Specialist::Devops,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Specialist::Database => "database-agent",
            Specialist::Backend => "backend-agent",
            Specialist::Frontend => "frontend-agent",
            Specialist::Qa => "qa-agent",
            Specialist::Devops => "devops-agent",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Specialist::Database => "Database Agent",
            Specialist::Backend => "Backend Agent",
            Specialist::Frontend => "Frontend Agent",
            Specialist::Qa => "QA Agent",
            Specialist::Devops => "DevOps Agent",
        }
    }

    /// Short role keyword used in decomposition plans.
    pub fn role(self) -> &'static str {
        match self {
            Specialist::Database => "database",
            Specialist::Backend => "backend",
            Specialist::Frontend => "frontend",
            Specialist::Qa => "qa",
            Specialist::Devops => "devops",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Specialist::Database => "Schema design, migrations, SQL, data modeling",
            Specialist::Backend => "API endpoints, services, business logic, middleware",
            Specialist::Frontend => "UI components, state management, styling, accessibility",
            Specialist::Qa => "Unit tests, integration tests, coverage, edge cases",
            Specialist::Devops => "Deployment, CI/CD, Docker, infrastructure, monitoring",
        }
    }

    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            Specialist::Database => &[
                "schema",
                "migrations",
                "sql",
                "database",
                "tables",
                "indexes",
                "queries",
                "data-modeling",
            ],
            Specialist::Backend => &[
                "api",
                "endpoints",
                "services",
                "backend",
                "routes",
                "middleware",
                "business-logic",
                "validation",
            ],
            Specialist::Frontend => &[
                "ui",
                "components",
                "frontend",
                "react",
                "css",
                "state-management",
                "responsive",
                "accessibility",
            ],
            Specialist::Qa => &[
                "testing",
                "tests",
                "qa",
                "quality",
                "coverage",
                "integration-tests",
                "unit-tests",
                "validation",
            ],
            Specialist::Devops => &[
                "deployment",
                "ci-cd",
                "devops",
                "docker",
                "pipeline",
                "infrastructure",
                "monitoring",
                "environment",
            ],
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            Specialist::Database => profiles::DATABASE,
            Specialist::Backend => profiles::BACKEND,
            Specialist::Frontend => profiles::FRONTEND,
            Specialist::Qa => profiles::QA,
            Specialist::Devops => profiles::DEVOPS,
        }
    }
}

/// Ordered set of available specialists. Order matters: routing ties and
/// the last-resort fallback both resolve to the earliest registration.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: Vec<Specialist>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for worker in Specialist::ALL {
            registry.register(worker);
        }
        registry
    }

    /// Registering the same specialist twice keeps the first position.
    pub fn register(&mut self, worker: Specialist) {
        if !self.workers.contains(&worker) {
            self.workers.push(worker);
        }
    }

    pub fn get(&self, id: &str) -> Option<Specialist> {
        self.workers.iter().copied().find(|w| w.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = Specialist> + '_ {
        self.workers.iter().copied()
    }

    pub fn first(&self) -> Option<Specialist> {
        self.workers.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Mirrors the registry into the `agent_registry` table.
    pub async fn persist(&self, store: &Store) -> Result<()> {
        for worker in self.iter() {
            store
                .upsert_agent(worker.id(), worker.name(), SPECIALIST_ROLE, worker.capabilities())
                .await?;
        }
        Ok(())
    }
}
