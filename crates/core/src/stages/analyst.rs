//! Analyst stage: model-driven qualification of scouted leads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crm::{Campaign, CrmStore, Lead, LeadStatus};
use crate::enrich::Fetcher;
use crate::inference::InferenceEngine;
use crate::ledger::Purpose;
use crate::metrics;

use super::StageError;

/// Tunables for the analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Leads judged per campaign per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Bytes of the lead's website passed to the model.
    #[serde(default = "default_snapshot_bytes")]
    pub snapshot_bytes: usize,
}

fn default_batch_size() -> i64 {
    5
}

fn default_snapshot_bytes() -> usize {
    4_000
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            snapshot_bytes: default_snapshot_bytes(),
        }
    }
}

/// The verdict shape the model is asked to answer with.
#[derive(Debug, Deserialize)]
struct Verdict {
    verdict: String,
    #[serde(default)]
    discard_reason: Option<String>,
    #[serde(default)]
    pain_points: Vec<String>,
    #[serde(default)]
    quality_score: Option<i64>,
}

/// Judges whether a lead fits the campaign audience.
pub struct Analyst {
    crm: Arc<dyn CrmStore>,
    engine: Arc<InferenceEngine>,
    fetcher: Arc<dyn Fetcher>,
    config: AnalystConfig,
}

impl Analyst {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        engine: Arc<InferenceEngine>,
        fetcher: Arc<dyn Fetcher>,
        config: AnalystConfig,
    ) -> Self {
        Self {
            crm,
            engine,
            fetcher,
            config,
        }
    }

    /// Qualify one campaign batch. Returns the number of verdicts stored.
    ///
    /// A failed model call leaves the lead where it is for the next
    /// cycle; only a verdict moves a lead out of the analysis queue.
    pub async fn run(&self, campaign: &Campaign) -> Result<usize, StageError> {
        let batch = self
            .crm
            .list_leads_for_analysis(&campaign.id, self.config.batch_size)?;

        let mut judged = 0;
        for lead in batch {
            let verdict = match self.judge(campaign, &lead).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    warn!(lead = %lead.id, %error, "qualification failed, retrying next cycle");
                    continue;
                }
            };

            // Leads that skipped scouting still need the Scouted hop to
            // keep the history linear.
            if lead.status == LeadStatus::Hunted {
                self.crm.update_status(&lead.id, LeadStatus::Scouted)?;
            }

            let approved = verdict.verdict.eq_ignore_ascii_case("approve");
            let status = if approved {
                LeadStatus::Qualified
            } else {
                LeadStatus::Discarded
            };
            self.crm.set_qualification(
                &lead.id,
                status,
                verdict.discard_reason.as_deref(),
                &verdict.pain_points,
                verdict.quality_score,
            )?;

            info!(
                lead = %lead.id,
                business = %lead.business_name,
                verdict = %verdict.verdict,
                score = ?verdict.quality_score,
                "lead judged"
            );
            metrics::QUALIFICATION_VERDICTS
                .with_label_values(&[if approved { "approved" } else { "discarded" }])
                .inc();
            judged += 1;
        }

        Ok(judged)
    }

    async fn judge(&self, campaign: &Campaign, lead: &Lead) -> Result<Verdict, StageError> {
        let snapshot = match &lead.website {
            Some(website) => {
                let body = self.fetcher.fetch(website).await;
                truncate_utf8(&body, self.config.snapshot_bytes).to_string()
            }
            None => String::new(),
        };

        let prompt = format!(
            "You qualify sales prospects.\n\
             Target audience: {}\n\
             Business: {}\n\
             Website excerpt:\n{}\n\
             Answer with JSON only:\n\
             {{\"verdict\": \"approve\" or \"discard\", \
               \"discard_reason\": string or null, \
               \"pain_points\": [up to 3 short strings], \
               \"quality_score\": 0-100}}",
            campaign.audience, lead.business_name, snapshot
        );

        Ok(self.engine.generate_json(Purpose::Fast, &prompt).await?)
    }
}

/// Cut at a char boundary at or below `max_bytes`.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{CapacityConfig, CapacityManager};
    use crate::crm::SqliteCrmStore;
    use crate::inference::InferenceError;
    use crate::ledger::{SqliteCredentialStore, Tier};
    use crate::testing::{fixtures, MockFetcher, MockInferenceService};
    use chrono::Utc;

    struct Setup {
        analyst: Analyst,
        crm: Arc<SqliteCrmStore>,
        inference: Arc<MockInferenceService>,
        campaign: Campaign,
    }

    fn setup() -> Setup {
        let crm: Arc<SqliteCrmStore> = Arc::new(SqliteCrmStore::in_memory().unwrap());
        let ledger = Arc::new(SqliteCredentialStore::in_memory().unwrap());
        fixtures::credential(ledger.as_ref(), Tier::Free);
        let capacity = Arc::new(CapacityManager::new(ledger, CapacityConfig::default()));
        let inference = Arc::new(MockInferenceService::new());
        let engine = Arc::new(InferenceEngine::new(capacity, inference.clone()));
        let client = fixtures::client(crm.as_ref(), Utc::now().date_naive());
        let campaign = fixtures::campaign(crm.as_ref(), &client.id, 100);

        Setup {
            analyst: Analyst::new(
                crm.clone(),
                engine,
                Arc::new(MockFetcher::new()),
                AnalystConfig::default(),
            ),
            crm,
            inference,
            campaign,
        }
    }

    fn scouted_lead(s: &Setup, name: &str) -> Lead {
        let lead = fixtures::lead(s.crm.as_ref(), &s.campaign.id, name);
        s.crm.update_status(&lead.id, LeadStatus::Scouted).unwrap();
        lead
    }

    #[tokio::test]
    async fn test_approval_qualifies_lead() {
        let s = setup();
        let lead = scouted_lead(&s, "clinic-a");
        s.inference.set_response(
            r#"{"verdict": "approve", "pain_points": ["no online booking"], "quality_score": 80}"#,
        );

        assert_eq!(s.analyst.run(&s.campaign).await.unwrap(), 1);

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Qualified);
        assert_eq!(row.pain_points, vec!["no online booking"]);
        assert_eq!(row.quality_score, Some(80));
    }

    #[tokio::test]
    async fn test_discard_stores_reason() {
        let s = setup();
        let lead = scouted_lead(&s, "clinic-a");
        s.inference
            .set_response(r#"{"verdict": "discard", "discard_reason": "wrong sector"}"#);

        s.analyst.run(&s.campaign).await.unwrap();

        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Discarded);
        assert_eq!(row.discard_reason.as_deref(), Some("wrong sector"));
    }

    #[tokio::test]
    async fn test_model_failure_leaves_lead_queued() {
        let s = setup();
        let lead = scouted_lead(&s, "clinic-a");
        // Both attempts of the engine retry fail.
        s.inference
            .fail_next(InferenceError::Transient("down".to_string()));
        s.inference
            .fail_next(InferenceError::Transient("down".to_string()));

        assert_eq!(s.analyst.run(&s.campaign).await.unwrap(), 0);
        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Scouted);
    }

    #[tokio::test]
    async fn test_hunted_lead_with_email_gets_scouted_hop() {
        let s = setup();
        let lead = s
            .crm
            .insert_lead(crate::crm::NewLead {
                campaign_id: s.campaign.id.clone(),
                business_name: "clinic-b".to_string(),
                website: None,
                phone: None,
                email: Some("hi@clinic-b.test".to_string()),
            })
            .unwrap()
            .unwrap();
        s.inference.set_response(r#"{"verdict": "approve"}"#);

        assert_eq!(s.analyst.run(&s.campaign).await.unwrap(), 1);
        let row = s.crm.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Qualified);
    }

    #[test]
    fn test_truncate_utf8_respects_boundaries() {
        let s = "añejo";
        // Byte 2 falls inside the two-byte ñ.
        assert_eq!(truncate_utf8(s, 2), "a");
        assert_eq!(truncate_utf8(s, 3), "añ");
        assert_eq!(truncate_utf8(s, 100), "añejo");
    }
}
