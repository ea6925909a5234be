//! Credential storage trait.

use chrono::NaiveDate;
use thiserror::Error;

use super::types::{BanState, Credential, NewCredential, Tier};

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Credential not found.
    #[error("credential not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("ledger database error: {0}")]
    Database(String),
}

/// Trait for credential ledger backends.
///
/// Mutations are expressed as single guarded statements so that the
/// eligibility check and the counter update against one row are never
/// separated by an unbounded window, and so a permanent ban can never
/// be cleared by a concurrent rollover or success report.
pub trait CredentialStore: Send + Sync {
    /// Register a new credential.
    fn insert(&self, request: NewCredential) -> Result<Credential, LedgerError>;

    /// Get a credential by id.
    fn get(&self, id: &str) -> Result<Option<Credential>, LedgerError>;

    /// List all credentials in a tier.
    fn list_tier(&self, tier: Tier) -> Result<Vec<Credential>, LedgerError>;

    /// Persist the daily rollover for a credential: zero the counter and
    /// stamp `today`. No-op for permanently banned credentials, and also
    /// clears a `DailyExhausted` ban.
    fn reset_daily(&self, id: &str, today: NaiveDate) -> Result<(), LedgerError>;

    /// Record one successful call: +1 if the stored date is `today`,
    /// otherwise reset-to-1 with the date stamped (the success performs
    /// the rollover itself). Never touches a permanent ban.
    fn record_success(&self, id: &str, today: NaiveDate) -> Result<(), LedgerError>;

    /// Force the counter to `usage` with the given ban state.
    /// `stamp_date` controls whether `last_usage_date` is set to `today`
    /// (daily bans) or left untouched (permanent bans, which must survive
    /// rollover). An existing permanent ban is never downgraded.
    fn apply_ban(
        &self,
        id: &str,
        ban_state: BanState,
        usage: i64,
        stamp_date: Option<NaiveDate>,
    ) -> Result<(), LedgerError>;
}
