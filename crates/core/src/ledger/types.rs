//! Credential ledger types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pricing tier of an inference credential.
///
/// FREE credentials are always searched before PAID ones to conserve spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "free" => Some(Tier::Free),
            "paid" => Some(Tier::Paid),
            _ => None,
        }
    }
}

/// Task category a stage requests capacity for.
///
/// `General` satisfies every request; `Fast` is for high-volume shallow
/// calls (scoring, copy), `Deep` for strategy/planning calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    General,
    Fast,
    Deep,
}

impl Purpose {
    /// Whether a credential tagged with `self` can serve a request for
    /// `requested`.
    pub fn satisfies(&self, requested: Purpose) -> bool {
        *self == Purpose::General || *self == requested
    }
}

/// Ban state of a credential.
///
/// Replaces the sentinel-usage-value scheme: permanence is carried here,
/// not inferred from the size of the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanState {
    /// Usable, subject to the daily limit.
    Active,
    /// Blocked for the remainder of the current calendar day; clears at
    /// the next day's rollover.
    DailyExhausted,
    /// Dead credential (invalid key / missing model). Survives rollover,
    /// never downgraded.
    PermanentlyBanned,
}

impl BanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanState::Active => "active",
            BanState::DailyExhausted => "daily_exhausted",
            BanState::PermanentlyBanned => "permanently_banned",
        }
    }

    pub fn parse(s: &str) -> Option<BanState> {
        match s {
            "active" => Some(BanState::Active),
            "daily_exhausted" => Some(BanState::DailyExhausted),
            "permanently_banned" => Some(BanState::PermanentlyBanned),
            _ => None,
        }
    }
}

/// One inference credential bound to one logical model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    /// Provider API key.
    pub api_key: String,
    /// Logical model name the key is bound to.
    pub model_name: String,
    pub tier: Tier,
    /// Purpose tags. A credential tagged `General` serves every purpose.
    pub purposes: Vec<Purpose>,
    /// Calls counted against today's quota. May sit far above
    /// `daily_limit` while banned.
    pub usage_today: i64,
    pub daily_limit: i64,
    /// Headroom subtracted from the limit before exhaustion is declared,
    /// so the last request before the true limit never hard-fails.
    pub safety_margin: i64,
    /// Calendar day the counter belongs to. `None` for never-used keys.
    pub last_usage_date: Option<NaiveDate>,
    pub ban_state: BanState,
}

impl Credential {
    /// Whether this credential's tags cover the requested purpose.
    pub fn serves(&self, purpose: Purpose) -> bool {
        self.purposes.iter().any(|p| p.satisfies(purpose))
    }
}

/// Request to register a new credential.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub api_key: String,
    pub model_name: String,
    pub tier: Tier,
    pub purposes: Vec<Purpose>,
    pub daily_limit: i64,
    pub safety_margin: i64,
}
