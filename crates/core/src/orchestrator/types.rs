//! Types for the pipeline orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// CRM store error.
    #[error("crm error: {0}")]
    Crm(#[from] crate::crm::CrmError),

    /// Capacity manager error.
    #[error("capacity error: {0}")]
    Capacity(#[from] crate::capacity::CapacityError),

    /// Billing error.
    #[error("billing error: {0}")]
    Billing(#[from] crate::billing::BillingError),

    /// Stage error.
    #[error("stage error: {0}")]
    Stage(#[from] crate::stages::StageError),
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the cycle loop is running.
    pub running: bool,
    /// Cycles completed since start.
    pub cycles_completed: u64,
    /// Campaigns processed in the last completed cycle.
    pub last_cycle_campaigns: usize,
    /// Whether the last cycle was aborted on an exhausted FREE pool.
    pub last_cycle_aborted: bool,
}
