//! CRM storage trait.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use super::types::{
    Campaign, Client, Lead, LeadStatus, NewCampaign, NewClient, NewLead, PipelineCounts,
};

/// Error type for CRM operations.
#[derive(Debug, Error)]
pub enum CrmError {
    /// Entity not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requested status change is not a legal pipeline edge.
    #[error("invalid lead transition: {from:?} -> {to:?}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    /// Settlement attempted against a balance below the monthly fee.
    #[error("insufficient balance for client {0}")]
    InsufficientBalance(String),

    /// Database error.
    #[error("crm database error: {0}")]
    Database(String),
}

/// Trait for CRM backends.
///
/// Lead mutations enforce the pipeline state machine: `update_status`
/// rejects any edge [`LeadStatus::can_transition`] does not allow, so a
/// lead can never move backwards however the stages are interleaved.
pub trait CrmStore: Send + Sync {
    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    fn insert_client(&self, request: NewClient) -> Result<Client, CrmError>;

    fn get_client(&self, id: &str) -> Result<Option<Client>, CrmError>;

    fn list_active_clients(&self) -> Result<Vec<Client>, CrmError>;

    /// Active clients whose payment falls due within `window_days` of
    /// `today` and who have not been reminded yet.
    fn list_clients_due_reminder(
        &self,
        today: NaiveDate,
        window_days: i64,
    ) -> Result<Vec<Client>, CrmError>;

    fn mark_reminder_sent(&self, id: &str) -> Result<(), CrmError>;

    /// Active clients whose payment date is `today` or earlier.
    fn list_clients_past_due(&self, today: NaiveDate) -> Result<Vec<Client>, CrmError>;

    /// Settle one period in a single transaction: debit the monthly fee,
    /// advance the payment date by `period_days` and clear the reminder
    /// flag. Fails if the balance does not cover the fee.
    fn settle_client(&self, id: &str, period_days: i64) -> Result<Client, CrmError>;

    /// Deactivate a client. Campaigns stay in place but stop being
    /// runnable.
    fn suspend_client(&self, id: &str) -> Result<(), CrmError>;

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    fn insert_campaign(&self, request: NewCampaign) -> Result<Campaign, CrmError>;

    fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, CrmError>;

    /// Active campaigns whose owning client is also active.
    fn list_runnable_campaigns(&self) -> Result<Vec<Campaign>, CrmError>;

    // ------------------------------------------------------------------
    // Leads
    // ------------------------------------------------------------------

    /// Insert a hunted lead. Returns `None` when the campaign already
    /// holds a lead with the same business name (dedup by natural key).
    fn insert_lead(&self, request: NewLead) -> Result<Option<Lead>, CrmError>;

    fn get_lead(&self, id: &str) -> Result<Option<Lead>, CrmError>;

    /// Leads of a campaign created at or after `since`, any status.
    /// Used for the intra-day hunting ration, where leads that already
    /// advanced still count against what was hunted today.
    fn count_leads_since(
        &self,
        campaign_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, CrmError>;

    /// Leads of a campaign created at or after `since` that still sit
    /// in `Hunted`. The monthly budget ceiling caps the unprocessed
    /// backlog, so leads the pipeline has digested no longer count.
    fn count_hunted_since(
        &self,
        campaign_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, CrmError>;

    fn list_leads_by_status(
        &self,
        campaign_id: &str,
        status: LeadStatus,
        limit: i64,
    ) -> Result<Vec<Lead>, CrmError>;

    /// Leads ready for qualification: Scouted, plus Hunted leads that
    /// already carry an email and need no scouting.
    fn list_leads_for_analysis(
        &self,
        campaign_id: &str,
        limit: i64,
    ) -> Result<Vec<Lead>, CrmError>;

    /// Move a lead along the pipeline. Rejects illegal edges.
    fn update_status(&self, id: &str, to: LeadStatus) -> Result<(), CrmError>;

    /// Store the email the scout found (status change is separate).
    fn set_scouted_email(&self, id: &str, email: Option<&str>) -> Result<(), CrmError>;

    /// Store the analyst verdict payload alongside the status change.
    fn set_qualification(
        &self,
        id: &str,
        status: LeadStatus,
        discard_reason: Option<&str>,
        pain_points: &[String],
        quality_score: Option<i64>,
    ) -> Result<(), CrmError>;

    /// Record the first outreach: message copy, channel and timestamp,
    /// moving the lead to Persuaded.
    fn set_outreach(
        &self,
        id: &str,
        message: &str,
        channel: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CrmError>;

    /// Advance the follow-up ladder: bump the step and stamp the contact
    /// time. Status is untouched.
    fn set_nurture_state(
        &self,
        id: &str,
        step: i64,
        at: DateTime<Utc>,
    ) -> Result<(), CrmError>;

    /// A prospect replied to outreach: move Persuaded -> Nurturing and
    /// store the reply address when one was learned.
    fn capture(&self, id: &str, email: Option<&str>) -> Result<(), CrmError>;

    /// Count one reply on a nurturing lead.
    fn record_interaction(&self, id: &str) -> Result<(), CrmError>;

    /// Promote every Nurturing lead of the campaign with at least
    /// `min_interactions` replies to ValidatedBillable. Returns how many
    /// were promoted.
    fn promote_billable(
        &self,
        campaign_id: &str,
        min_interactions: i64,
    ) -> Result<i64, CrmError>;

    /// Pipeline totals across all campaigns of a client since `since`.
    fn pipeline_counts(
        &self,
        client_id: &str,
        since: DateTime<Utc>,
    ) -> Result<PipelineCounts, CrmError>;
}
