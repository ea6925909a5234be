//! CRM storage: clients, campaigns and the lead pipeline state machine.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteCrmStore;
pub use store::{CrmError, CrmStore};
pub use types::{
    Campaign, Client, Lead, LeadStatus, NewCampaign, NewClient, NewLead, PipelineCounts,
};
