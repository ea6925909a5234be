//! Billing settlement and the nurture grace gate.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::crm::{Client, CrmError, CrmStore};
use crate::metrics;
use crate::notify::{Channel, Message, Notifier, NotifyError};

/// Tunables for billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Days before the due date a payment reminder goes out.
    #[serde(default = "default_reminder_days")]
    pub reminder_days: i64,

    /// Days past a missed payment during which nurture continues.
    #[serde(default = "default_grace_days")]
    pub grace_days: i64,

    /// Length in days of one billing period.
    #[serde(default = "default_renewal_period_days")]
    pub renewal_period_days: i64,
}

fn default_reminder_days() -> i64 {
    3
}

fn default_grace_days() -> i64 {
    5
}

fn default_renewal_period_days() -> i64 {
    30
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            reminder_days: default_reminder_days(),
            grace_days: default_grace_days(),
            renewal_period_days: default_renewal_period_days(),
        }
    }
}

/// Errors from settlement.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Crm(#[from] CrmError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Settles client accounts and gates nurture on payment standing.
pub struct BillingEngine {
    crm: Arc<dyn CrmStore>,
    notifier: Arc<dyn Notifier>,
    config: BillingConfig,
}

impl BillingEngine {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        notifier: Arc<dyn Notifier>,
        config: BillingConfig,
    ) -> Self {
        Self {
            crm,
            notifier,
            config,
        }
    }

    /// Run one settlement pass: send due reminders, then charge or
    /// suspend every past-due client. Idempotent within a day, so the
    /// orchestrator may call it every cycle.
    pub async fn settle_all(&self) -> Result<(), BillingError> {
        self.settle_all_on(Utc::now().date_naive()).await
    }

    /// Date-explicit variant of [`settle_all`](Self::settle_all).
    pub async fn settle_all_on(&self, today: NaiveDate) -> Result<(), BillingError> {
        for client in self
            .crm
            .list_clients_due_reminder(today, self.config.reminder_days)?
        {
            self.send_reminder(&client).await?;
            self.crm.mark_reminder_sent(&client.id)?;
        }

        for client in self.crm.list_clients_past_due(today)? {
            if client.balance >= client.monthly_fee {
                let settled = self
                    .crm
                    .settle_client(&client.id, self.config.renewal_period_days)?;
                info!(
                    client = %client.id,
                    balance = settled.balance,
                    next_due = %settled.next_payment_date,
                    "billing period settled"
                );
                metrics::SETTLEMENTS_TOTAL
                    .with_label_values(&["charged"])
                    .inc();
            } else {
                warn!(
                    client = %client.id,
                    balance = client.balance,
                    fee = client.monthly_fee,
                    "balance does not cover the fee, suspending client"
                );
                self.crm.suspend_client(&client.id)?;
                self.send_suspension_notice(&client).await?;
                metrics::SETTLEMENTS_TOTAL
                    .with_label_values(&["suspended"])
                    .inc();
            }
        }

        Ok(())
    }

    /// Whether follow-ups for this client's leads may still go out.
    ///
    /// Suspension stops new hunting immediately, but leads already in
    /// conversation get a short grace window so a late payment does not
    /// burn warm prospects.
    pub fn can_nurture(&self, client: &Client, today: NaiveDate) -> bool {
        if client.active {
            return true;
        }
        today <= client.next_payment_date + Duration::days(self.config.grace_days)
    }

    async fn send_reminder(&self, client: &Client) -> Result<(), NotifyError> {
        self.notifier
            .send(&Message {
                channel: Channel::Email,
                recipient: client.email.clone(),
                subject: "Upcoming payment".to_string(),
                body: format!(
                    "Hi {}, your next payment of {:.2} is due on {}.",
                    client.name, client.monthly_fee, client.next_payment_date
                ),
            })
            .await
    }

    async fn send_suspension_notice(&self, client: &Client) -> Result<(), NotifyError> {
        self.notifier
            .send(&Message {
                channel: Channel::Email,
                recipient: client.email.clone(),
                subject: "Service paused".to_string(),
                body: format!(
                    "Hi {}, we could not collect your payment of {:.2}. \
                     Prospecting is paused until the balance is topped up.",
                    client.name, client.monthly_fee
                ),
            })
            .await
    }
}
