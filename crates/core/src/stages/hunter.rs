//! Hunter stage: discover new businesses for a campaign.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::budget::BudgetGate;
use crate::crm::{Campaign, CrmStore, NewLead};
use crate::inference::InferenceEngine;
use crate::ledger::Purpose;
use crate::metrics;

use super::{LeadSource, RawLead, StageError};

#[derive(Debug, Deserialize)]
struct PlannedQuery {
    query: String,
}

/// Finds raw businesses through the lead source, under the budget gate.
pub struct Hunter {
    crm: Arc<dyn CrmStore>,
    budget: Arc<BudgetGate>,
    engine: Arc<InferenceEngine>,
    source: Arc<dyn LeadSource>,
}

impl Hunter {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        budget: Arc<BudgetGate>,
        engine: Arc<InferenceEngine>,
        source: Arc<dyn LeadSource>,
    ) -> Self {
        Self {
            crm,
            budget,
            engine,
            source,
        }
    }

    /// Hunt for one campaign. Returns the number of leads recorded.
    pub async fn run(&self, campaign: &Campaign) -> Result<usize, StageError> {
        let today = Utc::now().date_naive();
        let authorized = self
            .budget
            .authorized_daily_quantity(&campaign.id, today)?;
        if authorized == 0 {
            debug!(campaign = %campaign.id, "no raw-lead budget left, skipping hunt");
            return Ok(0);
        }

        // The budget slice is a per-day ration, so leads already hunted
        // today count against it.
        let midnight = Utc
            .from_utc_datetime(&today.and_hms_opt(0, 0, 0).unwrap_or_default());
        let hunted_today = self.crm.count_leads_since(&campaign.id, midnight)?;
        let remaining = authorized - hunted_today;
        if remaining <= 0 {
            debug!(
                campaign = %campaign.id,
                authorized,
                hunted_today,
                "daily ration already hunted"
            );
            return Ok(0);
        }

        let query = self.plan_query(campaign).await;
        let raw = self
            .source
            .discover(&query, &campaign.location, remaining)
            .await?;
        debug!(campaign = %campaign.id, %query, found = raw.len(), "discovery returned");

        let mut recorded = 0;
        for lead in raw {
            if !has_contact_surface(&lead) {
                continue;
            }
            let inserted = self.crm.insert_lead(NewLead {
                campaign_id: campaign.id.clone(),
                business_name: lead.business_name,
                website: lead.website,
                phone: lead.phone,
                email: lead.email,
            })?;
            if inserted.is_some() {
                recorded += 1;
            }
        }

        if recorded > 0 {
            info!(campaign = %campaign.id, recorded, "new leads hunted");
            metrics::LEADS_HUNTED.inc_by(recorded as u64);
        }
        Ok(recorded)
    }

    /// Turn the campaign audience into a search query. Falls back to the
    /// literal audience text when the model is unavailable; a worse query
    /// still beats no hunt at all.
    async fn plan_query(&self, campaign: &Campaign) -> String {
        let prompt = format!(
            "You plan searches against a business directory.\n\
             Audience: {}\n\
             Location: {}\n\
             Answer with JSON only: {{\"query\": \"<short search phrase>\"}}",
            campaign.audience, campaign.location
        );

        match self
            .engine
            .generate_json::<PlannedQuery>(Purpose::Deep, &prompt)
            .await
        {
            Ok(planned) if !planned.query.trim().is_empty() => planned.query,
            Ok(_) => campaign.audience.clone(),
            Err(error) => {
                warn!(campaign = %campaign.id, %error, "query planning failed, using audience text");
                campaign.audience.clone()
            }
        }
    }
}

/// A lead with no website, phone or email can never be contacted and is
/// not worth a row.
fn has_contact_surface(lead: &RawLead) -> bool {
    lead.website.is_some() || lead.phone.is_some() || lead.email.is_some()
}
