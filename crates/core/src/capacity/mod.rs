//! Capacity allocation over the credential ledger.

mod config;
mod manager;

pub use config::CapacityConfig;
pub use manager::{effective_usage, CapacityError, CapacityManager};
