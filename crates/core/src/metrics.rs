//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (cycles, stage runs, campaign passes)
//! - Capacity (credential bans, pool exhaustion)
//! - Billing (settlements, suspensions)
//! - Inference (calls, retries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Orchestration cycles total by outcome.
pub static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("prospector_cycles_total", "Total orchestration cycles"),
        &["result"], // "completed", "aborted_no_capacity", "failed"
    )
    .unwrap()
});

/// Cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "prospector_cycle_duration_seconds",
            "Duration of orchestration cycles",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &[],
    )
    .unwrap()
});

/// Stage executions total by stage and result.
pub static STAGE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("prospector_stage_runs_total", "Total pipeline stage runs"),
        &["stage", "result"], // stage: "hunter".."nurturer", result: "success", "failed"
    )
    .unwrap()
});

/// Campaigns processed per cycle.
pub static CAMPAIGNS_PROCESSED: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "prospector_campaigns_processed",
            "Number of campaigns processed per cycle",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Capacity Metrics
// =============================================================================

/// Credential bans applied by kind.
pub static CREDENTIAL_BANS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("prospector_credential_bans_total", "Total credential bans"),
        &["kind"], // "daily", "permanent"
    )
    .unwrap()
});

/// Cycles aborted because the FREE pool was exhausted.
pub static POOL_EXHAUSTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "prospector_pool_exhaustions_total",
        "Total cycles aborted on an exhausted credential pool",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Leads hunted total.
pub static LEADS_HUNTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("prospector_leads_hunted_total", "Total leads hunted").unwrap()
});

/// Qualification verdicts total by outcome.
pub static QUALIFICATION_VERDICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "prospector_qualification_verdicts_total",
            "Total qualification verdicts",
        ),
        &["verdict"], // "approved", "discarded"
    )
    .unwrap()
});

/// Outreach dispatches total by channel and result.
pub static OUTREACH_DISPATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "prospector_outreach_dispatches_total",
            "Total outreach dispatches",
        ),
        &["channel", "result"], // channel: "email", "social"
    )
    .unwrap()
});

/// Leads promoted to billable.
pub static BILLABLE_PROMOTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "prospector_billable_promotions_total",
        "Total leads promoted to validated billable",
    )
    .unwrap()
});

// =============================================================================
// Billing Metrics
// =============================================================================

/// Billing settlements total by outcome.
pub static SETTLEMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("prospector_settlements_total", "Total billing settlements"),
        &["result"], // "charged", "suspended", "failed"
    )
    .unwrap()
});

// =============================================================================
// Inference Metrics
// =============================================================================

/// Inference calls total by purpose and status.
pub static INFERENCE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("prospector_inference_calls_total", "Total inference calls"),
        &["purpose", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Inference call duration in seconds.
pub static INFERENCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "prospector_inference_duration_seconds",
            "Duration of inference calls",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["purpose"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(STAGE_RUNS.clone()),
        Box::new(CAMPAIGNS_PROCESSED.clone()),
        // Capacity
        Box::new(CREDENTIAL_BANS.clone()),
        Box::new(POOL_EXHAUSTIONS.clone()),
        // Pipeline
        Box::new(LEADS_HUNTED.clone()),
        Box::new(QUALIFICATION_VERDICTS.clone()),
        Box::new(OUTREACH_DISPATCHES.clone()),
        Box::new(BILLABLE_PROMOTIONS.clone()),
        // Billing
        Box::new(SETTLEMENTS_TOTAL.clone()),
        // Inference
        Box::new(INFERENCE_CALLS.clone()),
        Box::new(INFERENCE_DURATION.clone()),
    ]
}
