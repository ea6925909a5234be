//! SQLite-backed credential ledger.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use super::store::{CredentialStore, LedgerError};
use super::types::{BanState, Credential, NewCredential, Purpose, Tier};

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (and initialize if needed) a file-backed store.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL,
                model_name TEXT NOT NULL,
                tier TEXT NOT NULL,
                purposes TEXT NOT NULL,
                usage_today INTEGER NOT NULL DEFAULT 0,
                daily_limit INTEGER NOT NULL,
                safety_margin INTEGER NOT NULL DEFAULT 0,
                last_usage_date TEXT,
                ban_state TEXT NOT NULL DEFAULT 'active'
            );

            CREATE INDEX IF NOT EXISTS idx_credentials_tier ON credentials(tier);
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_credential(row: &rusqlite::Row) -> rusqlite::Result<Credential> {
        let id: String = row.get(0)?;
        let api_key: String = row.get(1)?;
        let model_name: String = row.get(2)?;
        let tier_str: String = row.get(3)?;
        let purposes_json: String = row.get(4)?;
        let usage_today: i64 = row.get(5)?;
        let daily_limit: i64 = row.get(6)?;
        let safety_margin: i64 = row.get(7)?;
        let last_usage_date_str: Option<String> = row.get(8)?;
        let ban_state_str: String = row.get(9)?;

        let tier = Tier::parse(&tier_str).unwrap_or(Tier::Paid);
        let ban_state = BanState::parse(&ban_state_str).unwrap_or(BanState::Active);
        let purposes: Vec<Purpose> =
            serde_json::from_str(&purposes_json).unwrap_or_else(|_| vec![Purpose::General]);
        let last_usage_date = last_usage_date_str
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok());

        Ok(Credential {
            id,
            api_key,
            model_name,
            tier,
            purposes,
            usage_today,
            daily_limit,
            safety_margin,
            last_usage_date,
            ban_state,
        })
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn insert(&self, request: NewCredential) -> Result<Credential, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let purposes_json = serde_json::to_string(&request.purposes)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO credentials (id, api_key, model_name, tier, purposes, usage_today, daily_limit, safety_margin, last_usage_date, ban_state)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, NULL, 'active')",
            params![
                id,
                request.api_key,
                request.model_name,
                request.tier.as_str(),
                purposes_json,
                request.daily_limit,
                request.safety_margin,
            ],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(Credential {
            id,
            api_key: request.api_key,
            model_name: request.model_name,
            tier: request.tier,
            purposes: request.purposes,
            usage_today: 0,
            daily_limit: request.daily_limit,
            safety_margin: request.safety_margin,
            last_usage_date: None,
            ban_state: BanState::Active,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Credential>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT id, api_key, model_name, tier, purposes, usage_today, daily_limit, safety_margin, last_usage_date, ban_state
             FROM credentials WHERE id = ?",
            params![id],
            Self::row_to_credential,
        );

        match result {
            Ok(credential) => Ok(Some(credential)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LedgerError::Database(e.to_string())),
        }
    }

    fn list_tier(&self, tier: Tier) -> Result<Vec<Credential>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, api_key, model_name, tier, purposes, usage_today, daily_limit, safety_margin, last_usage_date, ban_state
                 FROM credentials WHERE tier = ?",
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![tier.as_str()], Self::row_to_credential)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut credentials = Vec::new();
        for row in rows {
            credentials.push(row.map_err(|e| LedgerError::Database(e.to_string()))?);
        }
        Ok(credentials)
    }

    fn reset_daily(&self, id: &str, today: NaiveDate) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();

        // The ban_state guard is what makes a permanent ban survive any
        // number of rollovers.
        conn.execute(
            "UPDATE credentials
             SET usage_today = 0, last_usage_date = ?, ban_state = 'active'
             WHERE id = ? AND ban_state != 'permanently_banned'",
            params![today.format(DATE_FMT).to_string(), id],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn record_success(&self, id: &str, today: NaiveDate) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let today_str = today.format(DATE_FMT).to_string();

        let changed = conn
            .execute(
                "UPDATE credentials
                 SET usage_today = CASE WHEN last_usage_date = ?1 THEN usage_today + 1 ELSE 1 END,
                     last_usage_date = ?1
                 WHERE id = ?2 AND ban_state != 'permanently_banned'",
                params![today_str, id],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if changed == 0 && self.get_inner(&conn, id)?.is_none() {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn apply_ban(
        &self,
        id: &str,
        ban_state: BanState,
        usage: i64,
        stamp_date: Option<NaiveDate>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();

        let changed = match stamp_date {
            Some(date) => conn.execute(
                "UPDATE credentials
                 SET usage_today = ?, ban_state = ?, last_usage_date = ?
                 WHERE id = ? AND ban_state != 'permanently_banned'",
                params![
                    usage,
                    ban_state.as_str(),
                    date.format(DATE_FMT).to_string(),
                    id
                ],
            ),
            None => conn.execute(
                "UPDATE credentials
                 SET usage_today = ?, ban_state = ?
                 WHERE id = ? AND ban_state != 'permanently_banned'",
                params![usage, ban_state.as_str(), id],
            ),
        }
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        if changed == 0 && self.get_inner(&conn, id)?.is_none() {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl SqliteCredentialStore {
    fn get_inner(
        &self,
        conn: &Connection,
        id: &str,
    ) -> Result<Option<Credential>, LedgerError> {
        let result = conn.query_row(
            "SELECT id, api_key, model_name, tier, purposes, usage_today, daily_limit, safety_margin, last_usage_date, ban_state
             FROM credentials WHERE id = ?",
            params![id],
            Self::row_to_credential,
        );
        match result {
            Ok(credential) => Ok(Some(credential)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LedgerError::Database(e.to_string())),
        }
    }
}
