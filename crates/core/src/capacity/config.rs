//! Capacity manager configuration.

use serde::{Deserialize, Serialize};

/// Tunables for failure-driven credential banning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Added to `daily_limit` when a quota failure blocks a credential
    /// for the rest of the day. Any value safely above the limit works;
    /// the rollover clears it at midnight.
    #[serde(default = "default_quota_ban_offset")]
    pub quota_ban_offset: i64,

    /// `daily_limit` multiplier for the counter of a permanently banned
    /// credential. Kept alongside the explicit ban state so every usage
    /// readout makes the ban obvious.
    #[serde(default = "default_permanent_ban_multiplier")]
    pub permanent_ban_multiplier: i64,
}

fn default_quota_ban_offset() -> i64 {
    500
}

fn default_permanent_ban_multiplier() -> i64 {
    1000
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            quota_ban_offset: default_quota_ban_offset(),
            permanent_ban_multiplier: default_permanent_ban_multiplier(),
        }
    }
}
