//! Persuader stage: write and dispatch the first outreach message.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crm::{Campaign, CrmStore, Lead, LeadStatus};
use crate::inference::InferenceEngine;
use crate::ledger::Purpose;
use crate::metrics;
use crate::notify::{Channel, Message, Notifier};

use super::StageError;

/// Tunables for the persuader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersuaderConfig {
    /// Leads contacted per campaign per cycle. Kept small so one bad
    /// prompt cannot blast a whole campaign.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    3
}

impl Default for PersuaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// The copy shape the model is asked to answer with: long-form for
/// email, short-form for a social DM.
#[derive(Debug, Deserialize)]
struct OutreachCopy {
    subject: String,
    email_body: String,
    social_body: String,
}

/// Writes personalized first-touch copy and sends it out.
pub struct Persuader {
    crm: Arc<dyn CrmStore>,
    engine: Arc<InferenceEngine>,
    notifier: Arc<dyn Notifier>,
    config: PersuaderConfig,
}

impl Persuader {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        engine: Arc<InferenceEngine>,
        notifier: Arc<dyn Notifier>,
        config: PersuaderConfig,
    ) -> Self {
        Self {
            crm,
            engine,
            notifier,
            config,
        }
    }

    /// Contact one campaign batch. Returns the number of leads reached.
    pub async fn run(&self, campaign: &Campaign) -> Result<usize, StageError> {
        let batch = self.crm.list_leads_by_status(
            &campaign.id,
            LeadStatus::Qualified,
            self.config.batch_size,
        )?;

        let mut reached = 0;
        for lead in batch {
            let Some((channel, recipient)) = pick_channel(&lead) else {
                info!(lead = %lead.id, "no contact channel, marking failed");
                self.crm.update_status(&lead.id, LeadStatus::ContactFailed)?;
                continue;
            };

            let copy = match self.write_copy(campaign, &lead).await {
                Ok(copy) => copy,
                Err(error) => {
                    warn!(lead = %lead.id, %error, "copywriting failed, retrying next cycle");
                    continue;
                }
            };

            let body = match channel {
                Channel::Email => copy.email_body,
                Channel::Social => copy.social_body,
            };
            let message = Message {
                channel,
                recipient: recipient.clone(),
                subject: copy.subject,
                body,
            };

            match self.notifier.send(&message).await {
                Ok(()) => {
                    self.crm.set_outreach(
                        &lead.id,
                        &message.body,
                        channel.as_str(),
                        Utc::now(),
                    )?;
                    info!(
                        lead = %lead.id,
                        business = %lead.business_name,
                        channel = channel.as_str(),
                        "first outreach dispatched"
                    );
                    metrics::OUTREACH_DISPATCHES
                        .with_label_values(&[channel.as_str(), "success"])
                        .inc();
                    reached += 1;
                }
                Err(error) => {
                    warn!(lead = %lead.id, %error, "dispatch failed, retrying next cycle");
                    metrics::OUTREACH_DISPATCHES
                        .with_label_values(&[channel.as_str(), "failed"])
                        .inc();
                }
            }
        }

        Ok(reached)
    }

    async fn write_copy(
        &self,
        campaign: &Campaign,
        lead: &Lead,
    ) -> Result<OutreachCopy, StageError> {
        let pain_points = if lead.pain_points.is_empty() {
            "unknown".to_string()
        } else {
            lead.pain_points.join("; ")
        };

        let prompt = format!(
            "You write first-contact B2B outreach.\n\
             Audience: {}\n\
             Business: {}\n\
             Observed pain points: {}\n\
             Write two variants of the same pitch and answer with JSON only:\n\
             {{\"subject\": \"<email subject>\", \
               \"email_body\": \"<4-6 sentence email>\", \
               \"social_body\": \"<2 sentence direct message>\"}}",
            campaign.audience, lead.business_name, pain_points
        );

        Ok(self.engine.generate_json(Purpose::Fast, &prompt).await?)
    }
}

/// Email when there is an address, otherwise a social DM keyed on the
/// phone number. A lead with neither cannot be reached.
fn pick_channel(lead: &Lead) -> Option<(Channel, String)> {
    if let Some(email) = &lead.email {
        return Some((Channel::Email, email.clone()));
    }
    lead.phone
        .as_ref()
        .map(|phone| (Channel::Social, phone.clone()))
}
