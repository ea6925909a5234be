//! The five pipeline stages, each a self-contained worker the
//! orchestrator runs in order per campaign.

mod analyst;
mod hunter;
mod nurturer;
mod persuader;
mod scout;
mod source;

pub use analyst::{Analyst, AnalystConfig};
pub use hunter::Hunter;
pub use nurturer::{Nurturer, NurtureConfig};
pub use persuader::{Persuader, PersuaderConfig};
pub use scout::{Scout, ScoutConfig};
pub use source::{LeadSource, RawLead, SourceError};

use thiserror::Error;

/// Error type shared by all stages.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Crm(#[from] crate::crm::CrmError),

    #[error(transparent)]
    Budget(#[from] crate::budget::BudgetError),

    #[error(transparent)]
    Inference(#[from] crate::inference::EngineError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Notify(#[from] crate::notify::NotifyError),
}
