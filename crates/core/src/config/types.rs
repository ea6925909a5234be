use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::billing::BillingConfig;
use crate::budget::BudgetConfig;
use crate::capacity::CapacityConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::stages::{AnalystConfig, NurtureConfig, PersuaderConfig, ScoutConfig};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub scout: ScoutConfig,
    #[serde(default)]
    pub analyst: AnalystConfig,
    #[serde(default)]
    pub persuader: PersuaderConfig,
    #[serde(default)]
    pub nurture: NurtureConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            inference: InferenceConfig::default(),
            capacity: CapacityConfig::default(),
            budget: BudgetConfig::default(),
            billing: BillingConfig::default(),
            scout: ScoutConfig::default(),
            analyst: AnalystConfig::default(),
            persuader: PersuaderConfig::default(),
            nurture: NurtureConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// CRM database (clients, campaigns, leads).
    #[serde(default = "default_crm_path")]
    pub crm_path: PathBuf,

    /// Credential ledger database.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            crm_path: default_crm_path(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_crm_path() -> PathBuf {
    PathBuf::from("prospector.db")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("ledger.db")
}

/// Inference provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Override the provider API base URL (proxies, test servers).
    #[serde(default)]
    pub api_base: Option<String>,
}
