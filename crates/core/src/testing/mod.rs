//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of all external service
//! traits, allowing full pipeline tests without real infrastructure.

mod mock_fetcher;
mod mock_inference;
mod mock_notifier;
mod mock_source;

pub use mock_fetcher::MockFetcher;
pub use mock_inference::{MockInferenceService, RecordedInference};
pub use mock_notifier::MockNotifier;
pub use mock_source::{MockLeadSource, RecordedDiscovery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::crm::{Campaign, Client, CrmStore, Lead, NewCampaign, NewClient, NewLead};
    use crate::ledger::{Credential, CredentialStore, NewCredential, Purpose, Tier};
    use crate::stages::RawLead;

    /// Insert a funded, active client with reasonable defaults.
    pub fn client(crm: &dyn CrmStore, next_payment: NaiveDate) -> Client {
        crm.insert_client(NewClient {
            name: "Acme Dental".to_string(),
            email: "billing@acme.test".to_string(),
            monthly_fee: 400.0,
            balance: 2000.0,
            next_payment_date: next_payment,
        })
        .unwrap()
    }

    /// Insert an active campaign for a client.
    pub fn campaign(crm: &dyn CrmStore, client_id: &str, contracted: i64) -> Campaign {
        crm.insert_campaign(NewCampaign {
            client_id: client_id.to_string(),
            audience: "dental clinics".to_string(),
            location: "Madrid".to_string(),
            contracted_quantity: contracted,
        })
        .unwrap()
    }

    /// Insert a hunted lead with a website and no email.
    pub fn lead(crm: &dyn CrmStore, campaign_id: &str, name: &str) -> Lead {
        crm.insert_lead(NewLead {
            campaign_id: campaign_id.to_string(),
            business_name: name.to_string(),
            website: Some(format!("https://{name}.test")),
            phone: Some("+34 600 000 000".to_string()),
            email: None,
        })
        .unwrap()
        .unwrap()
    }

    /// Insert a general-purpose credential in the given tier.
    pub fn credential(ledger: &dyn CredentialStore, tier: Tier) -> Credential {
        ledger
            .insert(NewCredential {
                api_key: "sk-test".to_string(),
                model_name: "flash-2".to_string(),
                tier,
                purposes: vec![Purpose::General],
                daily_limit: 1000,
                safety_margin: 10,
            })
            .unwrap()
    }

    /// A raw lead as a discovery backend would return it.
    pub fn raw_lead(name: &str) -> RawLead {
        RawLead {
            business_name: name.to_string(),
            website: Some(format!("https://{name}.test")),
            phone: Some("+34 600 000 000".to_string()),
            email: None,
        }
    }
}
