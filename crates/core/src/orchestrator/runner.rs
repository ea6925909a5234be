//! Pipeline orchestrator implementation.
//!
//! Drives every runnable campaign through the five stages in order:
//! settle billing first, then per campaign hunt, scout, analyze,
//! persuade and nurture. One cycle loop, sequential campaigns; the
//! provider quota pool is the scarce resource and parallel campaigns
//! would only race each other for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::billing::BillingEngine;
use crate::budget::BudgetGate;
use crate::capacity::CapacityManager;
use crate::crm::{Campaign, CrmStore};
use crate::metrics;
use crate::notify::{Channel, Message, Notifier};
use crate::stages::{Analyst, Hunter, Nurturer, Persuader, Scout};

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus};

/// Outcome of one orchestration cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Campaigns fully processed.
    pub campaigns_processed: usize,
    /// True when the cycle stopped early on an exhausted FREE pool.
    pub aborted_on_capacity: bool,
}

/// The pipeline orchestrator: owns the cycle loop and the stage order.
pub struct PipelineOrchestrator {
    config: OrchestratorConfig,
    crm: Arc<dyn CrmStore>,
    capacity: Arc<CapacityManager>,
    billing: Arc<BillingEngine>,
    budget: Arc<BudgetGate>,
    notifier: Arc<dyn Notifier>,

    hunter: Arc<Hunter>,
    scout: Arc<Scout>,
    analyst: Arc<Analyst>,
    persuader: Arc<Persuader>,
    nurturer: Arc<Nurturer>,

    // Runtime state
    running: Arc<AtomicBool>,
    status: Arc<RwLock<OrchestratorStatus>>,
    last_report_at: Arc<RwLock<DateTime<Utc>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        crm: Arc<dyn CrmStore>,
        capacity: Arc<CapacityManager>,
        billing: Arc<BillingEngine>,
        budget: Arc<BudgetGate>,
        notifier: Arc<dyn Notifier>,
        hunter: Arc<Hunter>,
        scout: Arc<Scout>,
        analyst: Arc<Analyst>,
        persuader: Arc<Persuader>,
        nurturer: Arc<Nurturer>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            crm,
            capacity,
            billing,
            budget,
            notifier,
            hunter,
            scout,
            analyst,
            persuader,
            nurturer,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(OrchestratorStatus::default())),
            last_report_at: Arc::new(RwLock::new(Utc::now())),
            shutdown_tx,
        }
    }

    /// Start the cycle loop (spawns a background task).
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting pipeline orchestrator");
        self.status.write().await.running = true;
        self.spawn_cycle_loop();
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping pipeline orchestrator");
        self.status.write().await.running = false;
        let _ = self.shutdown_tx.send(());
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        self.status.read().await.clone()
    }

    fn spawn_cycle_loop(self: &Arc<Self>) {
        let orchestrator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Cycle loop started");
            loop {
                if !orchestrator.running.load(Ordering::Relaxed) {
                    break;
                }

                let started = Instant::now();
                let outcome = orchestrator.run_cycle().await;
                let elapsed = started.elapsed();

                let sleep = match outcome {
                    Ok(outcome) => {
                        metrics::CYCLE_DURATION
                            .with_label_values(&[])
                            .observe(elapsed.as_secs_f64());
                        orchestrator.pick_sleep(elapsed, &outcome)
                    }
                    Err(e) => {
                        error!("Cycle failed: {}", e);
                        metrics::CYCLES_TOTAL.with_label_values(&["failed"]).inc();
                        Duration::from_secs(orchestrator.config.min_sleep_secs)
                    }
                };

                debug!(sleep_secs = sleep.as_secs(), "cycle done, sleeping");
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Cycle loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(sleep) => {}
                }
            }
            info!("Cycle loop stopped");
        });
    }

    /// Sleep long after an overrun cycle, otherwise pad out to the
    /// target, never below the minimum.
    fn pick_sleep(&self, elapsed: Duration, outcome: &CycleOutcome) -> Duration {
        if outcome.aborted_on_capacity {
            // Pool exhausted: nothing to do until quotas recover.
            return Duration::from_secs(self.config.long_pass_sleep_secs);
        }
        let target = Duration::from_secs(self.config.cycle_target_secs);
        if elapsed >= target {
            Duration::from_secs(self.config.long_pass_sleep_secs)
        } else {
            (target - elapsed).max(Duration::from_secs(self.config.min_sleep_secs))
        }
    }

    /// Run one full orchestration cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, OrchestratorError> {
        self.billing.settle_all().await?;

        let campaigns = self.crm.list_runnable_campaigns()?;
        info!(campaigns = campaigns.len(), "cycle started");

        let mut processed = 0;
        let mut aborted = false;
        for campaign in &campaigns {
            // Governor: without FREE capacity every remaining campaign
            // would drain the PAID pool, so the whole pass stops here.
            if !self.capacity.has_global_capacity()? {
                warn!("FREE credential pool exhausted, aborting pass");
                metrics::POOL_EXHAUSTIONS.inc();
                aborted = true;
                break;
            }

            self.process_campaign(campaign).await;
            processed += 1;

            if processed < campaigns.len() {
                tokio::time::sleep(self.campaign_cooldown(campaigns.len())).await;
            }
        }

        self.maybe_send_reports().await;

        metrics::CYCLES_TOTAL
            .with_label_values(&[if aborted {
                "aborted_no_capacity"
            } else {
                "completed"
            }])
            .inc();
        metrics::CAMPAIGNS_PROCESSED
            .with_label_values(&[])
            .observe(processed as f64);

        let mut status = self.status.write().await;
        status.cycles_completed += 1;
        status.last_cycle_campaigns = processed;
        status.last_cycle_aborted = aborted;

        Ok(CycleOutcome {
            campaigns_processed: processed,
            aborted_on_capacity: aborted,
        })
    }

    /// Run the five stages for one campaign. A stage failure is logged
    /// and the next stage still runs; one bad campaign or provider blip
    /// must never stall the whole daemon.
    async fn process_campaign(&self, campaign: &Campaign) {
        debug!(campaign = %campaign.id, audience = %campaign.audience, "processing campaign");

        let budget_left = self
            .budget
            .authorized_daily_quantity(&campaign.id, Utc::now().date_naive())
            .unwrap_or(0);

        if budget_left > 0 {
            self.run_stage("hunter", self.hunter.run(campaign)).await;
            self.run_stage("scout", self.scout.run(campaign)).await;
        } else {
            debug!(campaign = %campaign.id, "lead budget exhausted, skipping hunt and scout");
        }

        // Later stages work down the existing backlog even when the
        // hunting budget is spent.
        self.run_stage("analyst", self.analyst.run(campaign)).await;
        self.run_stage("persuader", self.persuader.run(campaign)).await;
        self.run_stage("nurturer", self.nurturer.run(campaign)).await;
    }

    async fn run_stage<F>(&self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = Result<usize, crate::stages::StageError>>,
    {
        match fut.await {
            Ok(count) => {
                debug!(stage = name, count, "stage finished");
                metrics::STAGE_RUNS.with_label_values(&[name, "success"]).inc();
            }
            Err(e) => {
                error!(stage = name, "stage failed: {}", e);
                metrics::STAGE_RUNS.with_label_values(&[name, "failed"]).inc();
            }
        }
    }

    /// Shorter cooldown when the pass carries many campaigns, so a big
    /// book of business still finishes inside the cycle target.
    fn campaign_cooldown(&self, campaign_count: usize) -> Duration {
        if campaign_count > self.config.busy_campaign_threshold {
            Duration::from_secs(self.config.campaign_cooldown_busy_secs)
        } else {
            Duration::from_secs(self.config.campaign_cooldown_secs)
        }
    }

    /// Mail each active client a pipeline summary once per report
    /// interval.
    async fn maybe_send_reports(&self) {
        let now = Utc::now();
        {
            let last = self.last_report_at.read().await;
            if now - *last < chrono::Duration::hours(self.config.report_interval_hours) {
                return;
            }
        }
        *self.last_report_at.write().await = now;

        let clients = match self.crm.list_active_clients() {
            Ok(clients) => clients,
            Err(e) => {
                warn!("report skipped, could not list clients: {}", e);
                return;
            }
        };

        let since = now - chrono::Duration::hours(self.config.report_interval_hours);
        for client in clients {
            let counts = match self.crm.pipeline_counts(&client.id, since) {
                Ok(counts) => counts,
                Err(e) => {
                    warn!(client = %client.id, "report counts failed: {}", e);
                    continue;
                }
            };

            let body = format!(
                "Pipeline summary for {}:\n\
                 new prospects found: {}\n\
                 qualified: {}\n\
                 contacted: {}\n\
                 in conversation: {}\n\
                 validated: {}",
                client.name,
                counts.hunted,
                counts.qualified,
                counts.persuaded,
                counts.nurturing,
                counts.billable
            );
            let send = self
                .notifier
                .send(&Message {
                    channel: Channel::Email,
                    recipient: client.email.clone(),
                    subject: "Your prospecting update".to_string(),
                    body,
                })
                .await;
            if let Err(e) = send {
                warn!(client = %client.id, "report dispatch failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BillingConfig;
    use crate::budget::BudgetConfig;
    use crate::capacity::CapacityConfig;
    use crate::crm::{LeadStatus, SqliteCrmStore};
    use crate::inference::InferenceEngine;
    use crate::ledger::{SqliteCredentialStore, Tier};
    use crate::stages::{AnalystConfig, NurtureConfig, PersuaderConfig, ScoutConfig};
    use crate::testing::{
        fixtures, MockFetcher, MockInferenceService, MockLeadSource, MockNotifier,
    };

    struct Harness {
        orchestrator: PipelineOrchestrator,
        crm: Arc<SqliteCrmStore>,
        ledger: Arc<SqliteCredentialStore>,
        inference: Arc<MockInferenceService>,
        source: Arc<MockLeadSource>,
        notifier: Arc<MockNotifier>,
    }

    fn harness() -> Harness {
        harness_with(OrchestratorConfig {
            campaign_cooldown_secs: 0,
            campaign_cooldown_busy_secs: 0,
            ..OrchestratorConfig::default()
        })
    }

    fn harness_with(config: OrchestratorConfig) -> Harness {
        let crm: Arc<SqliteCrmStore> = Arc::new(SqliteCrmStore::in_memory().unwrap());
        let ledger: Arc<SqliteCredentialStore> =
            Arc::new(SqliteCredentialStore::in_memory().unwrap());
        let capacity = Arc::new(CapacityManager::new(
            ledger.clone(),
            CapacityConfig::default(),
        ));
        let inference = Arc::new(MockInferenceService::new());
        let engine = Arc::new(InferenceEngine::new(capacity.clone(), inference.clone()));
        let notifier = Arc::new(MockNotifier::new());
        let billing = Arc::new(BillingEngine::new(
            crm.clone(),
            notifier.clone(),
            BillingConfig::default(),
        ));
        let budget = Arc::new(BudgetGate::new(crm.clone(), BudgetConfig::default()));
        let fetcher = Arc::new(MockFetcher::new());
        let source = Arc::new(MockLeadSource::new());

        let hunter = Arc::new(Hunter::new(
            crm.clone(),
            budget.clone(),
            engine.clone(),
            source.clone(),
        ));
        let scout = Arc::new(Scout::new(
            crm.clone(),
            fetcher.clone(),
            ScoutConfig::default(),
        ));
        let analyst = Arc::new(Analyst::new(
            crm.clone(),
            engine.clone(),
            fetcher.clone(),
            AnalystConfig::default(),
        ));
        let persuader = Arc::new(Persuader::new(
            crm.clone(),
            engine.clone(),
            notifier.clone(),
            PersuaderConfig::default(),
        ));
        let nurturer = Arc::new(Nurturer::new(
            crm.clone(),
            billing.clone(),
            engine.clone(),
            notifier.clone(),
            NurtureConfig::default(),
        ));

        Harness {
            orchestrator: PipelineOrchestrator::new(
                config,
                crm.clone(),
                capacity,
                billing,
                budget,
                notifier.clone(),
                hunter,
                scout,
                analyst,
                persuader,
                nurturer,
            ),
            crm,
            ledger,
            inference,
            source,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_cycle_moves_leads_through_pipeline() {
        let h = harness();
        fixtures::credential(h.ledger.as_ref(), Tier::Free);
        let client = fixtures::client(
            h.crm.as_ref(),
            Utc::now().date_naive() + chrono::Duration::days(10),
        );
        let campaign = fixtures::campaign(h.crm.as_ref(), &client.id, 100);

        h.source.set_results(vec![fixtures::raw_lead("clinic-a")]);
        // Query planning, then the analyst verdict, then outreach copy.
        h.inference.push_response(r#"{"query": "dental clinics madrid"}"#);
        h.inference.push_response(r#"{"verdict": "approve", "quality_score": 90}"#);
        h.inference.push_response(
            r#"{"subject": "Idea", "email_body": "Long pitch.", "social_body": "Short pitch."}"#,
        );

        let outcome = h.orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome.campaigns_processed, 1);
        assert!(!outcome.aborted_on_capacity);

        // Hunted, scouted (no email on the mock site), judged, contacted
        // over social (phone only), all within one cycle.
        let persuaded = h
            .crm
            .list_leads_by_status(&campaign.id, LeadStatus::Persuaded, 10)
            .unwrap();
        assert_eq!(persuaded.len(), 1);
        assert_eq!(persuaded[0].business_name, "clinic-a");

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Short pitch.");
    }

    #[tokio::test]
    async fn test_cycle_aborts_without_free_capacity() {
        let h = harness();
        // Only a PAID credential: the governor must stop the pass.
        fixtures::credential(h.ledger.as_ref(), Tier::Paid);
        let client = fixtures::client(
            h.crm.as_ref(),
            Utc::now().date_naive() + chrono::Duration::days(10),
        );
        fixtures::campaign(h.crm.as_ref(), &client.id, 100);
        h.source.set_results(vec![fixtures::raw_lead("clinic-a")]);

        let outcome = h.orchestrator.run_cycle().await.unwrap();
        assert!(outcome.aborted_on_capacity);
        assert_eq!(outcome.campaigns_processed, 0);
        assert!(h.source.discoveries().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_settles_billing_first() {
        let h = harness();
        fixtures::credential(h.ledger.as_ref(), Tier::Free);
        // Unfunded and past due: the cycle starts by suspending them,
        // which also removes their campaign from the pass.
        let broke = h
            .crm
            .insert_client(crate::crm::NewClient {
                name: "Broke Co".to_string(),
                email: "broke@test".to_string(),
                monthly_fee: 400.0,
                balance: 0.0,
                next_payment_date: Utc::now().date_naive(),
            })
            .unwrap();
        fixtures::campaign(h.crm.as_ref(), &broke.id, 100);

        let outcome = h.orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome.campaigns_processed, 0);

        let row = h.crm.get_client(&broke.id).unwrap().unwrap();
        assert!(!row.active);
    }

    #[tokio::test]
    async fn test_stage_failure_does_not_stop_cycle() {
        let h = harness();
        fixtures::credential(h.ledger.as_ref(), Tier::Free);
        let client = fixtures::client(
            h.crm.as_ref(),
            Utc::now().date_naive() + chrono::Duration::days(10),
        );
        fixtures::campaign(h.crm.as_ref(), &client.id, 100);

        // Discovery blows up; the cycle still completes.
        h.source
            .set_next_error(crate::stages::SourceError::Unavailable("down".to_string()));
        h.inference.set_response(r#"{"query": "q"}"#);

        let outcome = h.orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome.campaigns_processed, 1);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let h = harness();
        let orchestrator = Arc::new(h.orchestrator);

        orchestrator.start().await;
        assert!(orchestrator.status().await.running);

        orchestrator.stop().await;
        assert!(!orchestrator.status().await.running);
    }

    #[test]
    fn test_campaign_cooldown_keys_on_campaign_count() {
        let h = harness_with(OrchestratorConfig::default());

        // At or below the threshold each campaign gets the full breather.
        assert_eq!(
            h.orchestrator.campaign_cooldown(1),
            Duration::from_secs(30)
        );
        assert_eq!(
            h.orchestrator.campaign_cooldown(10),
            Duration::from_secs(30)
        );
        // A pass with more than ten campaigns shortens the gap.
        assert_eq!(
            h.orchestrator.campaign_cooldown(11),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_pick_sleep_adaptive() {
        let h = harness();
        let quick = CycleOutcome {
            campaigns_processed: 1,
            aborted_on_capacity: false,
        };

        // Fast cycle pads out toward the hourly target.
        let sleep = h
            .orchestrator
            .pick_sleep(Duration::from_secs(100), &quick);
        assert_eq!(sleep, Duration::from_secs(3500));

        // Nearly-on-target cycle still sleeps the minimum.
        let sleep = h
            .orchestrator
            .pick_sleep(Duration::from_secs(3550), &quick);
        assert_eq!(sleep, Duration::from_secs(600));

        // Overrun cycle backs off long.
        let sleep = h
            .orchestrator
            .pick_sleep(Duration::from_secs(4000), &quick);
        assert_eq!(sleep, Duration::from_secs(1800));

        // Exhausted pool backs off long regardless of timing.
        let aborted = CycleOutcome {
            campaigns_processed: 0,
            aborted_on_capacity: true,
        };
        let sleep = h.orchestrator.pick_sleep(Duration::from_secs(1), &aborted);
        assert_eq!(sleep, Duration::from_secs(1800));
    }
}
