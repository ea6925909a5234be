use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prospector_core::billing::BillingEngine;
use prospector_core::budget::BudgetGate;
use prospector_core::capacity::CapacityManager;
use prospector_core::crm::{CrmStore, SqliteCrmStore};
use prospector_core::enrich::{Fetcher, HttpFetcher};
use prospector_core::inference::{GeminiClient, InferenceEngine, InferenceService};
use prospector_core::ledger::{CredentialStore, SqliteCredentialStore};
use prospector_core::notify::{LogNotifier, Notifier};
use prospector_core::orchestrator::PipelineOrchestrator;
use prospector_core::stages::{
    Analyst, Hunter, LeadSource, Nurturer, Persuader, RawLead, Scout, SourceError,
};
use prospector_core::{load_config, validate_config};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lead source placeholder until a directory backend is configured; it
/// discovers nothing, which leaves hunting idle but the rest of the
/// pipeline (analysis, outreach, nurture, billing) fully live.
struct NullLeadSource;

#[async_trait::async_trait]
impl LeadSource for NullLeadSource {
    async fn discover(
        &self,
        _query: &str,
        _location: &str,
        _limit: i64,
    ) -> Result<Vec<RawLead>, SourceError> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("prospector {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("PROSPECTOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    // Register metrics so a scraper sidecar can collect them.
    let registry = prometheus::Registry::new();
    for metric in prospector_core::metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metrics")?;
    }

    // Stores
    let crm: Arc<dyn CrmStore> = Arc::new(
        SqliteCrmStore::new(&config.database.crm_path).context("Failed to open CRM database")?,
    );
    info!("CRM store initialized at {:?}", config.database.crm_path);

    let ledger: Arc<dyn CredentialStore> = Arc::new(
        SqliteCredentialStore::new(&config.database.ledger_path)
            .context("Failed to open credential ledger")?,
    );
    info!(
        "Credential ledger initialized at {:?}",
        config.database.ledger_path
    );

    // Inference plumbing
    let capacity = Arc::new(CapacityManager::new(
        Arc::clone(&ledger),
        config.capacity.clone(),
    ));
    let gemini = match &config.inference.api_base {
        Some(base) => GeminiClient::new().with_api_base(base.clone()),
        None => GeminiClient::new(),
    };
    let service: Arc<dyn InferenceService> = Arc::new(gemini);
    let engine = Arc::new(InferenceEngine::new(Arc::clone(&capacity), service));

    // Collaborators
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());
    let source: Arc<dyn LeadSource> = Arc::new(NullLeadSource);
    let billing = Arc::new(BillingEngine::new(
        Arc::clone(&crm),
        Arc::clone(&notifier),
        config.billing.clone(),
    ));
    let budget = Arc::new(BudgetGate::new(Arc::clone(&crm), config.budget.clone()));

    // Stages
    let hunter = Arc::new(Hunter::new(
        Arc::clone(&crm),
        Arc::clone(&budget),
        Arc::clone(&engine),
        source,
    ));
    let scout = Arc::new(Scout::new(
        Arc::clone(&crm),
        Arc::clone(&fetcher),
        config.scout.clone(),
    ));
    let analyst = Arc::new(Analyst::new(
        Arc::clone(&crm),
        Arc::clone(&engine),
        Arc::clone(&fetcher),
        config.analyst.clone(),
    ));
    let persuader = Arc::new(Persuader::new(
        Arc::clone(&crm),
        Arc::clone(&engine),
        Arc::clone(&notifier),
        config.persuader.clone(),
    ));
    let nurturer = Arc::new(Nurturer::new(
        Arc::clone(&crm),
        Arc::clone(&billing),
        Arc::clone(&engine),
        Arc::clone(&notifier),
        config.nurture.clone(),
    ));

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config.orchestrator.clone(),
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
    ));

    orchestrator.start().await;
    info!("Pipeline orchestrator started");

    shutdown_signal().await;
    info!("Shutdown signal received");

    orchestrator.stop().await;
    info!("prospector stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
