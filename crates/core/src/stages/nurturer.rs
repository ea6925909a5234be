//! Nurturer stage: follow-up ladder for leads in conversation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::billing::BillingEngine;
use crate::crm::{Campaign, Client, CrmStore, Lead, LeadStatus};
use crate::inference::InferenceEngine;
use crate::ledger::Purpose;
use crate::metrics;
use crate::notify::{Channel, Message, Notifier};

use super::StageError;

/// One angle per rung of the follow-up ladder. Step 1 is the first
/// outreach itself, written by the persuader.
const LADDER_ANGLES: &[&str] = &[
    "gentle reminder referencing the first message",
    "one concrete benefit they are missing out on",
    "short customer success story from a similar business",
    "answer the most common objection before they raise it",
    "useful free tip they can apply today, no ask",
    "limited availability this month, soft urgency",
    "polite break-up message, door left open",
];

/// Tunables for the nurturer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurtureConfig {
    /// Hours between consecutive follow-ups to one lead.
    #[serde(default = "default_step_interval_hours")]
    pub step_interval_hours: i64,

    /// Ladder length including the first outreach. Past this the lead
    /// goes cold.
    #[serde(default = "default_max_steps")]
    pub max_steps: i64,

    /// Replies required before a lead counts against the contract.
    #[serde(default = "default_min_interactions_billable")]
    pub min_interactions_billable: i64,

    /// Leads followed up per campaign per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_step_interval_hours() -> i64 {
    48
}

fn default_max_steps() -> i64 {
    7
}

fn default_min_interactions_billable() -> i64 {
    3
}

fn default_batch_size() -> i64 {
    20
}

impl Default for NurtureConfig {
    fn default() -> Self {
        Self {
            step_interval_hours: default_step_interval_hours(),
            max_steps: default_max_steps(),
            min_interactions_billable: default_min_interactions_billable(),
            batch_size: default_batch_size(),
        }
    }
}

/// Walks nurturing leads up the follow-up ladder and promotes engaged
/// ones to billable.
pub struct Nurturer {
    crm: Arc<dyn CrmStore>,
    billing: Arc<BillingEngine>,
    engine: Arc<InferenceEngine>,
    notifier: Arc<dyn Notifier>,
    config: NurtureConfig,
}

impl Nurturer {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        billing: Arc<BillingEngine>,
        engine: Arc<InferenceEngine>,
        notifier: Arc<dyn Notifier>,
        config: NurtureConfig,
    ) -> Self {
        Self {
            crm,
            billing,
            engine,
            notifier,
            config,
        }
    }

    /// Nurture one campaign batch. Returns the number of leads promoted
    /// to billable.
    pub async fn run(&self, campaign: &Campaign) -> Result<usize, StageError> {
        let Some(client) = self.crm.get_client(&campaign.client_id)? else {
            warn!(campaign = %campaign.id, "campaign without client, skipping nurture");
            return Ok(0);
        };

        // A lapsed client past the grace window gets no follow-ups, but
        // interaction counting and promotion continue regardless.
        let today = Utc::now().date_naive();
        if self.billing.can_nurture(&client, today) {
            self.follow_up_batch(campaign, &client).await?;
        } else {
            debug!(campaign = %campaign.id, client = %client.id, "client lapsed, follow-ups paused");
        }

        let promoted = self
            .crm
            .promote_billable(&campaign.id, self.config.min_interactions_billable)?;
        if promoted > 0 {
            info!(campaign = %campaign.id, promoted, "leads validated as billable");
            metrics::BILLABLE_PROMOTIONS.inc_by(promoted as u64);
        }

        Ok(promoted as usize)
    }

    async fn follow_up_batch(
        &self,
        campaign: &Campaign,
        client: &Client,
    ) -> Result<(), StageError> {
        let batch = self.crm.list_leads_by_status(
            &campaign.id,
            LeadStatus::Nurturing,
            self.config.batch_size,
        )?;
        let now = Utc::now();

        for lead in batch {
            let due = match lead.last_contact_at {
                Some(at) => now - at >= Duration::hours(self.config.step_interval_hours),
                None => true,
            };
            if !due {
                continue;
            }

            let next_step = lead.nurture_step + 1;
            if next_step > self.config.max_steps {
                info!(lead = %lead.id, "ladder exhausted, lead goes cold");
                self.crm.update_status(&lead.id, LeadStatus::Cold)?;
                continue;
            }

            let Some(email) = lead.email.clone() else {
                // In conversation but no address on file: nothing to send
                // to, and waiting will not produce one.
                info!(lead = %lead.id, "nurturing lead without email, going cold");
                self.crm.update_status(&lead.id, LeadStatus::Cold)?;
                continue;
            };

            let body = match self.write_follow_up(campaign, client, &lead, next_step).await {
                Ok(body) => body,
                Err(error) => {
                    warn!(lead = %lead.id, %error, "follow-up writing failed, retrying next cycle");
                    continue;
                }
            };

            let send = self
                .notifier
                .send(&Message {
                    channel: Channel::Email,
                    recipient: email,
                    subject: format!("Re: {}", campaign.audience),
                    body,
                })
                .await;
            match send {
                Ok(()) => {
                    self.crm.set_nurture_state(&lead.id, next_step, now)?;
                    debug!(lead = %lead.id, step = next_step, "follow-up sent");
                }
                Err(error) => {
                    warn!(lead = %lead.id, %error, "follow-up dispatch failed");
                }
            }
        }

        Ok(())
    }

    async fn write_follow_up(
        &self,
        campaign: &Campaign,
        client: &Client,
        lead: &Lead,
        step: i64,
    ) -> Result<String, StageError> {
        // step is already bounded by max_steps; the saturating index is
        // for configs longer than the angle list.
        let angle = LADDER_ANGLES
            .get((step as usize).saturating_sub(2).min(LADDER_ANGLES.len() - 1))
            .unwrap_or(&LADDER_ANGLES[0]);

        let prompt = format!(
            "You write short follow-up emails for {}.\n\
             Prospect: {}\n\
             This is follow-up number {} of a sequence. Angle: {}.\n\
             Previous message:\n{}\n\
             Answer with the email body only, 3 sentences maximum, plain text.",
            client.name,
            lead.business_name,
            step - 1,
            angle,
            lead.outreach_message.as_deref().unwrap_or(""),
        );

        Ok(self.engine.generate(Purpose::Fast, &prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BillingConfig;
    use crate::capacity::{CapacityConfig, CapacityManager};
    use crate::crm::SqliteCrmStore;
    use crate::ledger::{SqliteCredentialStore, Tier};
    use crate::testing::{fixtures, MockInferenceService, MockNotifier};

    struct Setup {
        nurturer: Nurturer,
        crm: Arc<SqliteCrmStore>,
        notifier: Arc<MockNotifier>,
        campaign: Campaign,
        client: Client,
    }

    fn setup() -> Setup {
        let crm: Arc<SqliteCrmStore> = Arc::new(SqliteCrmStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteCredentialStore::in_memory().unwrap());
        fixtures::credential(ledger.as_ref(), Tier::Free);
        let capacity = Arc::new(CapacityManager::new(ledger, CapacityConfig::default()));
        let inference = Arc::new(MockInferenceService::new());
        inference.set_response("Just checking in.");
        let engine = Arc::new(InferenceEngine::new(capacity, inference));
        let notifier = Arc::new(MockNotifier::new());
        let billing = Arc::new(BillingEngine::new(
            crm.clone(),
            notifier.clone(),
            BillingConfig::default(),
        ));
        let client = fixtures::client(
            crm.as_ref(),
            Utc::now().date_naive() + Duration::days(10),
        );
        let campaign = fixtures::campaign(crm.as_ref(), &client.id, 100);

        Setup {
            nurturer: Nurturer::new(
                crm.clone(),
                billing,
                engine,
                notifier.clone(),
                NurtureConfig::default(),
            ),
            crm,
            notifier,
            campaign,
            client,
        }
    }

    fn nurturing_lead(s: &Setup, name: &str, step: i64, last_contact_hours_ago: i64) -> Lead {
        let lead = fixtures::lead(s.crm.as_ref(), &s.campaign.id, name);
        s.crm.update_status(&lead.id, LeadStatus::Scouted).unwrap();
        s.crm
            .set_scouted_email(&lead.id, Some(&format!("info@{name}.test")))
            .unwrap();
        s.crm.update_status(&lead.id, LeadStatus::Qualified).unwrap();
        s.crm
            .set_outreach(&lead.id, "first pitch", "email", Utc::now())
            .unwrap();
        s.crm.capture(&lead.id, None).unwrap();
        s.crm
            .set_nurture_state(
                &lead.id,
                step,
                Utc::now() - Duration::hours(last_contact_hours_ago),
            )
            .unwrap();
        s.crm.get_lead(&lead.id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_due_lead_gets_follow_up() {
        let s = setup();
        let lead = nurturing_lead(&s, "clinic-a", 1, 72);

        s.nurturer.run(&s.campaign).await.unwrap();

        let sent = s.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "info@clinic-a.test");
        assert_eq!(sent[0].body, "Just checking in.");

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.nurture_step, 2);
    }

    #[tokio::test]
    async fn test_recent_contact_waits() {
        let s = setup();
        let lead = nurturing_lead(&s, "clinic-a", 1, 10);

        s.nurturer.run(&s.campaign).await.unwrap();

        assert!(s.notifier.sent().is_empty());
        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.nurture_step, 1);
    }

    #[tokio::test]
    async fn test_ladder_exhaustion_goes_cold() {
        let s = setup();
        let lead = nurturing_lead(&s, "clinic-a", 7, 72);

        s.nurturer.run(&s.campaign).await.unwrap();

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Cold);
        assert!(s.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_engaged_lead_promoted_billable() {
        let s = setup();
        let lead = nurturing_lead(&s, "clinic-a", 2, 10);
        for _ in 0..3 {
            s.crm.record_interaction(&lead.id).unwrap();
        }

        let promoted = s.nurturer.run(&s.campaign).await.unwrap();
        assert_eq!(promoted, 1);

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::ValidatedBillable);
    }

    #[tokio::test]
    async fn test_lapsed_client_pauses_follow_ups_but_promotes() {
        let s = setup();
        let lead = nurturing_lead(&s, "clinic-a", 1, 72);
        for _ in 0..3 {
            s.crm.record_interaction(&lead.id).unwrap();
        }
        // Suspend and push the due date far into the past, well beyond
        // the grace window.
        s.crm.suspend_client(&s.client.id).unwrap();

        // Suspension takes the campaign out of the runnable set, but the
        // nurturer itself must still hold the line if invoked.
        let engine = &s.nurturer;
        let promoted = engine.run(&s.campaign).await.unwrap();

        // Grace window still open (due date in the future), so the
        // follow-up goes out and promotion happens.
        assert_eq!(promoted, 1);
        assert_eq!(s.notifier.sent().len(), 1);
        let _ = lead;
    }

    #[tokio::test]
    async fn test_nurturing_without_email_goes_cold() {
        let s = setup();
        let lead = fixtures::lead(s.crm.as_ref(), &s.campaign.id, "clinic-b");
        s.crm.update_status(&lead.id, LeadStatus::Scouted).unwrap();
        s.crm.update_status(&lead.id, LeadStatus::Qualified).unwrap();
        s.crm
            .set_outreach(&lead.id, "pitch", "social", Utc::now() - Duration::hours(72))
            .unwrap();
        s.crm.capture(&lead.id, None).unwrap();
        s.crm
            .set_nurture_state(&lead.id, 1, Utc::now() - Duration::hours(72))
            .unwrap();

        s.nurturer.run(&s.campaign).await.unwrap();

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Cold);
    }
}
