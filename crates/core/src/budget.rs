//! Budget gate: how many raw leads a campaign may hunt today.
//!
//! Hunting spends real API quota, so the monthly contract is converted
//! into a raw-lead ceiling and rationed over the month. The gate is the
//! single authority the hunter consults before pulling anything from
//! the lead source.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crm::{CrmError, CrmStore};

/// Tunables for the raw-lead budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Account-currency cost per contracted prospect per month.
    #[serde(default = "default_per_prospect_cost")]
    pub per_prospect_cost: f64,

    /// Raw leads one currency unit of spend is expected to surface.
    #[serde(default = "default_raw_leads_per_dollar")]
    pub raw_leads_per_dollar: f64,

    /// Contracted quantities below this are bumped up to it.
    #[serde(default = "default_min_contracted")]
    pub min_contracted: i64,

    /// A non-zero daily ration is never smaller than this.
    #[serde(default = "default_min_daily_batch")]
    pub min_daily_batch: i64,
}

fn default_per_prospect_cost() -> f64 {
    4.0
}

fn default_raw_leads_per_dollar() -> f64 {
    200.0
}

fn default_min_contracted() -> i64 {
    4
}

fn default_min_daily_batch() -> i64 {
    5
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_prospect_cost: default_per_prospect_cost(),
            raw_leads_per_dollar: default_raw_leads_per_dollar(),
            min_contracted: default_min_contracted(),
            min_daily_batch: default_min_daily_batch(),
        }
    }
}

/// Errors from budget computation.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    #[error(transparent)]
    Crm(#[from] CrmError),
}

/// Computes the remaining daily raw-lead ration for a campaign.
pub struct BudgetGate {
    crm: Arc<dyn CrmStore>,
    config: BudgetConfig,
}

impl BudgetGate {
    pub fn new(crm: Arc<dyn CrmStore>, config: BudgetConfig) -> Self {
        Self { crm, config }
    }

    /// Monthly raw-lead ceiling for a contracted quantity.
    pub fn monthly_ceiling(&self, contracted_quantity: i64) -> i64 {
        let contracted = contracted_quantity.max(self.config.min_contracted);
        let spend = contracted as f64 * self.config.per_prospect_cost;
        (spend * self.config.raw_leads_per_dollar) as i64
    }

    /// Raw leads the campaign may still hunt today.
    ///
    /// The monthly ceiling is rationed into ~30 even slices, and a slice
    /// is floored to the minimum batch so a small contract still moves
    /// every day. The ceiling caps the backlog of leads still sitting in
    /// `Hunted` this month: once the pipeline digests them the budget
    /// opens up again, and only a genuinely unprocessed pile freezes
    /// hunting at zero.
    pub fn authorized_daily_quantity(
        &self,
        campaign_id: &str,
        today: NaiveDate,
    ) -> Result<i64, BudgetError> {
        let Some(campaign) = self.crm.get_campaign(campaign_id)? else {
            return Err(BudgetError::CampaignNotFound(campaign_id.to_string()));
        };

        let ceiling = self.monthly_ceiling(campaign.contracted_quantity);

        let month_start = month_start_utc(today);
        let used = self.crm.count_hunted_since(campaign_id, month_start)?;
        let remaining = ceiling - used;
        if remaining <= 0 {
            debug!(campaign = %campaign_id, ceiling, used, "monthly lead budget exhausted");
            return Ok(0);
        }

        let slice = (ceiling / 30).max(self.config.min_daily_batch);
        Ok(slice.min(remaining))
    }
}

fn month_start_utc(today: NaiveDate) -> chrono::DateTime<Utc> {
    let first = today.with_day(1).unwrap_or(today);
    Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).unwrap_or_default())
}
