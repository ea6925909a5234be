//! Credential allocation over the shared ledger.
//!
//! Every stage that needs inference goes through [`CapacityManager`]:
//! `acquire` hands out one eligible credential (FREE tier first, chosen
//! uniformly at random among equals), `report_success` counts usage, and
//! `report_failure` bans the credential for the day or forever depending
//! on how the provider failed.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::inference::InferenceError;
use crate::ledger::{BanState, Credential, CredentialStore, LedgerError, Purpose, Tier};
use crate::metrics;

use super::config::CapacityConfig;

/// Errors from capacity allocation.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// Every eligible credential in both tiers is exhausted or banned.
    /// Fatal to the calling unit of work, never to the process.
    #[error("no inference capacity available for purpose {0:?}")]
    NoCapacityAvailable(Purpose),

    /// Ledger error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Usage counted against today's quota.
///
/// A stored counter from an earlier calendar day is forgiven: a new day
/// means a fresh quota regardless of what the row still says. This is
/// the single rollover function; every eligibility path goes through it
/// so the call sites cannot diverge.
pub fn effective_usage(credential: &Credential, today: NaiveDate) -> i64 {
    if credential.last_usage_date == Some(today) {
        credential.usage_today
    } else {
        0
    }
}

/// Allocates credentials from the shared pool.
pub struct CapacityManager {
    store: Arc<dyn CredentialStore>,
    config: CapacityConfig,
}

impl CapacityManager {
    pub fn new(store: Arc<dyn CredentialStore>, config: CapacityConfig) -> Self {
        Self { store, config }
    }

    /// Select one usable credential for `purpose`, FREE tier before PAID.
    pub fn acquire(&self, purpose: Purpose) -> Result<Credential, CapacityError> {
        self.acquire_on(purpose, Utc::now().date_naive())
    }

    /// Date-explicit variant of [`acquire`](Self::acquire) for
    /// deterministic tests across simulated midnights.
    pub fn acquire_on(
        &self,
        purpose: Purpose,
        today: NaiveDate,
    ) -> Result<Credential, CapacityError> {
        for tier in [Tier::Free, Tier::Paid] {
            let candidates = self.eligible_in_tier(tier, purpose, today, true)?;
            if let Some(chosen) = candidates.choose(&mut rand::thread_rng()) {
                debug!(
                    credential = %chosen.id,
                    model = %chosen.model_name,
                    tier = ?tier,
                    "credential assigned"
                );
                return Ok(chosen.clone());
            }
            if tier == Tier::Free {
                debug!("no FREE credentials available, falling back to PAID pool");
            }
        }

        warn!(?purpose, "credential pool exhausted");
        Err(CapacityError::NoCapacityAvailable(purpose))
    }

    /// Global pre-flight probe: is any FREE credential still eligible for
    /// general work? Read-only (no rollover persisted, no network), since
    /// it gates an entire orchestration pass and must be near-instant.
    pub fn has_global_capacity(&self) -> Result<bool, CapacityError> {
        self.has_global_capacity_on(Utc::now().date_naive())
    }

    /// Date-explicit variant of [`has_global_capacity`](Self::has_global_capacity).
    pub fn has_global_capacity_on(&self, today: NaiveDate) -> Result<bool, CapacityError> {
        let candidates = self.eligible_in_tier(Tier::Free, Purpose::General, today, false)?;
        Ok(!candidates.is_empty())
    }

    /// Record one successful inference call against a credential.
    pub fn report_success(&self, credential_id: &str) -> Result<(), CapacityError> {
        self.report_success_on(credential_id, Utc::now().date_naive())
    }

    /// Date-explicit variant of [`report_success`](Self::report_success).
    pub fn report_success_on(
        &self,
        credential_id: &str,
        today: NaiveDate,
    ) -> Result<(), CapacityError> {
        self.store.record_success(credential_id, today)?;
        Ok(())
    }

    /// Classify a provider failure and ban the credential accordingly.
    ///
    /// An invalid credential (404-class) is dead forever; its date stays
    /// untouched so the rollover forgiveness can never resurrect it.
    /// Quota exhaustion and anything unclassified block only for the
    /// remainder of the day (fail-safe: unknown errors never kill a key).
    pub fn report_failure(
        &self,
        credential_id: &str,
        error: &InferenceError,
    ) -> Result<(), CapacityError> {
        self.report_failure_on(credential_id, error, Utc::now().date_naive())
    }

    /// Date-explicit variant of [`report_failure`](Self::report_failure).
    pub fn report_failure_on(
        &self,
        credential_id: &str,
        error: &InferenceError,
        today: NaiveDate,
    ) -> Result<(), CapacityError> {
        let Some(credential) = self.store.get(credential_id)? else {
            return Err(CapacityError::Ledger(LedgerError::NotFound(
                credential_id.to_string(),
            )));
        };

        match error {
            InferenceError::CredentialInvalid(_) => {
                info!(
                    credential = %credential_id,
                    model = %credential.model_name,
                    "credential is invalid, removing from rotation permanently"
                );
                self.store.apply_ban(
                    credential_id,
                    BanState::PermanentlyBanned,
                    credential.daily_limit * self.config.permanent_ban_multiplier,
                    None,
                )?;
                metrics::CREDENTIAL_BANS.with_label_values(&["permanent"]).inc();
            }
            InferenceError::QuotaExceeded | InferenceError::Transient(_) => {
                info!(
                    credential = %credential_id,
                    model = %credential.model_name,
                    "credential blocked for the rest of the day"
                );
                self.store.apply_ban(
                    credential_id,
                    BanState::DailyExhausted,
                    credential.daily_limit + self.config.quota_ban_offset,
                    Some(today),
                )?;
                metrics::CREDENTIAL_BANS.with_label_values(&["daily"]).inc();
            }
        }

        Ok(())
    }

    /// List the eligible credentials of one tier, persisting the daily
    /// rollover for any stale row when `persist_rollover` is set, so
    /// subsequent readers in the same day see a consistent zero.
    fn eligible_in_tier(
        &self,
        tier: Tier,
        purpose: Purpose,
        today: NaiveDate,
        persist_rollover: bool,
    ) -> Result<Vec<Credential>, CapacityError> {
        let mut eligible = Vec::new();

        for mut credential in self.store.list_tier(tier)? {
            // Permanence is checked before any rollover forgiveness.
            if credential.ban_state == BanState::PermanentlyBanned {
                continue;
            }
            if !credential.serves(purpose) {
                continue;
            }

            let stale = credential.last_usage_date != Some(today);
            if stale && persist_rollover {
                self.store.reset_daily(&credential.id, today)?;
                credential.usage_today = 0;
                credential.last_usage_date = Some(today);
                credential.ban_state = BanState::Active;
            }

            let usage = effective_usage(&credential, today);
            if usage < credential.daily_limit - credential.safety_margin {
                eligible.push(credential);
            }
        }

        Ok(eligible)
    }
}
