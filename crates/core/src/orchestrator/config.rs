//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Target seconds between cycle starts. A fast cycle sleeps out the
    /// difference.
    #[serde(default = "default_cycle_target_secs")]
    pub cycle_target_secs: u64,

    /// Minimum sleep after a cycle, whatever the timing math says.
    #[serde(default = "default_min_sleep_secs")]
    pub min_sleep_secs: u64,

    /// Sleep after a cycle that overran the target, long enough for
    /// provider quotas to breathe.
    #[serde(default = "default_long_pass_sleep_secs")]
    pub long_pass_sleep_secs: u64,

    /// Seconds between campaigns within a cycle.
    #[serde(default = "default_campaign_cooldown_secs")]
    pub campaign_cooldown_secs: u64,

    /// Shortened cooldown when a pass has many campaigns to get
    /// through.
    #[serde(default = "default_campaign_cooldown_busy_secs")]
    pub campaign_cooldown_busy_secs: u64,

    /// Runnable campaigns in a pass past which the cooldown shortens.
    #[serde(default = "default_busy_campaign_threshold")]
    pub busy_campaign_threshold: usize,

    /// Hours between operator pipeline reports.
    #[serde(default = "default_report_interval_hours")]
    pub report_interval_hours: i64,
}

fn default_cycle_target_secs() -> u64 {
    3600
}

fn default_min_sleep_secs() -> u64 {
    600
}

fn default_long_pass_sleep_secs() -> u64 {
    1800
}

fn default_campaign_cooldown_secs() -> u64 {
    30
}

fn default_campaign_cooldown_busy_secs() -> u64 {
    10
}

fn default_busy_campaign_threshold() -> usize {
    10
}

fn default_report_interval_hours() -> i64 {
    24
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_target_secs: default_cycle_target_secs(),
            min_sleep_secs: default_min_sleep_secs(),
            long_pass_sleep_secs: default_long_pass_sleep_secs(),
            campaign_cooldown_secs: default_campaign_cooldown_secs(),
            campaign_cooldown_busy_secs: default_campaign_cooldown_busy_secs(),
            busy_campaign_threshold: default_busy_campaign_threshold(),
            report_interval_hours: default_report_interval_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.cycle_target_secs, 3600);
        assert_eq!(config.min_sleep_secs, 600);
        assert_eq!(config.long_pass_sleep_secs, 1800);
        assert_eq!(config.campaign_cooldown_secs, 30);
        assert_eq!(config.report_interval_hours, 24);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("cycle_target_secs = 60").unwrap();
        assert_eq!(config.cycle_target_secs, 60);
        assert_eq!(config.min_sleep_secs, 600);
    }
}
