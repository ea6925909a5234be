//! Scout stage: find a contact email on each hunted lead's website.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crm::{Campaign, CrmStore, LeadStatus};
use crate::enrich::{extract_contact_email, Fetcher};

use super::StageError;

/// Tunables for the scout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Leads inspected per campaign per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    10
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Scrapes lead websites for a contact address.
pub struct Scout {
    crm: Arc<dyn CrmStore>,
    fetcher: Arc<dyn Fetcher>,
    config: ScoutConfig,
}

impl Scout {
    pub fn new(crm: Arc<dyn CrmStore>, fetcher: Arc<dyn Fetcher>, config: ScoutConfig) -> Self {
        Self {
            crm,
            fetcher,
            config,
        }
    }

    /// Scout one campaign batch. Returns the number of leads processed.
    ///
    /// Every inspected lead advances to Scouted whether or not an email
    /// turned up; a dead or address-free website must not make the lead
    /// loop through this stage forever.
    pub async fn run(&self, campaign: &Campaign) -> Result<usize, StageError> {
        let batch = self
            .crm
            .list_leads_by_status(&campaign.id, LeadStatus::Hunted, self.config.batch_size)?;

        let mut processed = 0;
        for lead in batch {
            // Leads that arrived with an email go straight to analysis.
            if lead.email.is_some() {
                continue;
            }

            if let Some(website) = &lead.website {
                let body = self.fetcher.fetch(website).await;
                match extract_contact_email(&body) {
                    Some(email) => {
                        info!(lead = %lead.id, %email, "contact email found");
                        self.crm.set_scouted_email(&lead.id, Some(&email))?;
                    }
                    None => {
                        debug!(lead = %lead.id, %website, "no usable email on site");
                    }
                }
            }

            self.crm.update_status(&lead.id, LeadStatus::Scouted)?;
            processed += 1;
        }

        Ok(processed)
    }
}
