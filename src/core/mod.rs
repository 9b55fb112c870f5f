pub mod agent;
pub mod backend;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod store;
pub mod terminal;
pub mod text;
