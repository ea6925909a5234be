//! Credential ledger: storage for the shared pool of rate-limited
//! inference credentials. No allocation logic lives here; that belongs
//! to [`crate::capacity`].

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteCredentialStore;
pub use store::{CredentialStore, LedgerError};
pub use types::{BanState, Credential, NewCredential, Purpose, Tier};
