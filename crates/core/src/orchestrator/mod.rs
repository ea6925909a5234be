//! Pipeline orchestration: the cycle loop driving all campaigns.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{CycleOutcome, PipelineOrchestrator};
pub use types::{OrchestratorError, OrchestratorStatus};
