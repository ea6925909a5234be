//! Core CRM data types: clients, campaigns and leads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Client
// ============================================================================

/// A paying customer. One client owns many campaigns; billing and the
/// nurture gate operate at this level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Monthly fee in account currency units.
    pub monthly_fee: f64,
    /// Prepaid balance the settlement debits from.
    pub balance: f64,
    pub next_payment_date: NaiveDate,
    /// Set once the pre-due reminder went out; cleared on settlement.
    pub reminder_sent: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register a client.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub monthly_fee: f64,
    pub balance: f64,
    pub next_payment_date: NaiveDate,
}

// ============================================================================
// Campaign
// ============================================================================

/// A prospecting campaign: what to look for, where, and how much of it
/// the client has paid for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub client_id: String,
    /// Free-text description of the target audience.
    pub audience: String,
    /// Geographic focus passed to the lead source.
    pub location: String,
    /// Prospects per month the client contracted for.
    pub contracted_quantity: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to open a campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub client_id: String,
    pub audience: String,
    pub location: String,
    pub contracted_quantity: i64,
}

// ============================================================================
// Lead
// ============================================================================

/// Position of a lead in the pipeline.
///
/// ```text
/// Hunted -> Scouted -> Qualified -> Persuaded -> Nurturing -> ValidatedBillable
///                   \-> Discarded \-> ContactFailed        \-> Cold
/// ```
///
/// Transitions are monotonic: there is no path back towards an earlier
/// stage, and the terminal states (Discarded, ContactFailed, Cold,
/// ValidatedBillable) have no outgoing edges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Discovered by the hunter, contact data still raw.
    Hunted,
    /// Website scraped for an email address.
    Scouted,
    /// Model judged the business a fit for the campaign.
    Qualified,
    /// Model judged the business a poor fit.
    Discarded,
    /// First outreach dispatched.
    Persuaded,
    /// No usable channel, outreach impossible.
    ContactFailed,
    /// The prospect replied; follow-up ladder running.
    Nurturing,
    /// Ladder exhausted without enough engagement.
    Cold,
    /// Engaged enough to count against the client's contract.
    ValidatedBillable,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Hunted => "hunted",
            LeadStatus::Scouted => "scouted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Discarded => "discarded",
            LeadStatus::Persuaded => "persuaded",
            LeadStatus::ContactFailed => "contact_failed",
            LeadStatus::Nurturing => "nurturing",
            LeadStatus::Cold => "cold",
            LeadStatus::ValidatedBillable => "validated_billable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hunted" => Some(LeadStatus::Hunted),
            "scouted" => Some(LeadStatus::Scouted),
            "qualified" => Some(LeadStatus::Qualified),
            "discarded" => Some(LeadStatus::Discarded),
            "persuaded" => Some(LeadStatus::Persuaded),
            "contact_failed" => Some(LeadStatus::ContactFailed),
            "nurturing" => Some(LeadStatus::Nurturing),
            "cold" => Some(LeadStatus::Cold),
            "validated_billable" => Some(LeadStatus::ValidatedBillable),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Discarded
                | LeadStatus::ContactFailed
                | LeadStatus::Cold
                | LeadStatus::ValidatedBillable
        )
    }

    /// Whether `self -> to` is a legal pipeline edge.
    pub fn can_transition(&self, to: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, to),
            (Hunted, Scouted)
                | (Scouted, Qualified)
                | (Scouted, Discarded)
                | (Qualified, Persuaded)
                | (Qualified, ContactFailed)
                | (Persuaded, Nurturing)
                | (Nurturing, Cold)
                | (Nurturing, ValidatedBillable)
        )
    }
}

/// A single prospect inside a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: String,
    pub campaign_id: String,
    pub business_name: String,
    pub website: Option<String>,
    pub phone: Option<String>,
    /// Email found by the scout (or carried from the source).
    pub email: Option<String>,
    pub status: LeadStatus,
    /// Why the analyst discarded the lead, if it did.
    pub discard_reason: Option<String>,
    /// Pain points the analyst extracted, used by the persuader.
    pub pain_points: Vec<String>,
    /// Analyst fit score, 0 to 100.
    pub quality_score: Option<i64>,
    /// Copy of the first outreach message dispatched.
    pub outreach_message: Option<String>,
    /// Channel of the first outreach.
    pub outreach_channel: Option<String>,
    /// Follow-up ladder step, 1-based. 0 means not started.
    pub nurture_step: i64,
    pub last_contact_at: Option<DateTime<Utc>>,
    /// Replies recorded for this lead.
    pub interaction_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to record a freshly hunted lead.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub campaign_id: String,
    pub business_name: String,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Pipeline totals for one client, used by the daily report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    pub hunted: i64,
    pub qualified: i64,
    pub persuaded: i64,
    pub nurturing: i64,
    pub billable: i64,
}
