//! Core library for the prospector daemon: credential ledger and
//! capacity allocation, CRM storage, billing, and the five-stage lead
//! pipeline driven by the orchestrator.

pub mod billing;
pub mod budget;
pub mod capacity;
pub mod config;
pub mod crm;
pub mod enrich;
pub mod inference;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod stages;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use orchestrator::{OrchestratorConfig, OrchestratorStatus, PipelineOrchestrator};
