//! SQLite-backed CRM store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};

use super::store::{CrmError, CrmStore};
use super::types::{
    Campaign, Client, Lead, LeadStatus, NewCampaign, NewClient, NewLead, PipelineCounts,
};

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed CRM store holding clients, campaigns and leads.
pub struct SqliteCrmStore {
    conn: Mutex<Connection>,
}

impl SqliteCrmStore {
    /// Open (and initialize if needed) a file-backed store.
    pub fn new(path: &Path) -> Result<Self, CrmError> {
        let conn = Connection::open(path).map_err(|e| CrmError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CrmError> {
        let conn = Connection::open_in_memory().map_err(|e| CrmError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CrmError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                monthly_fee REAL NOT NULL,
                balance REAL NOT NULL DEFAULT 0,
                next_payment_date TEXT NOT NULL,
                reminder_sent INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES clients(id),
                audience TEXT NOT NULL,
                location TEXT NOT NULL,
                contracted_quantity INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id),
                business_name TEXT NOT NULL,
                website TEXT,
                phone TEXT,
                email TEXT,
                status TEXT NOT NULL DEFAULT 'hunted',
                discard_reason TEXT,
                pain_points TEXT NOT NULL DEFAULT '[]',
                quality_score INTEGER,
                outreach_message TEXT,
                outreach_channel TEXT,
                nurture_step INTEGER NOT NULL DEFAULT 0,
                last_contact_at TEXT,
                interaction_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(campaign_id, business_name)
            );

            CREATE INDEX IF NOT EXISTS idx_leads_campaign_status ON leads(campaign_id, status);
            CREATE INDEX IF NOT EXISTS idx_campaigns_client ON campaigns(client_id);
            "#,
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_client(row: &rusqlite::Row) -> rusqlite::Result<Client> {
        let next_payment_str: String = row.get(5)?;
        let created_at_str: String = row.get(8)?;

        Ok(Client {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            monthly_fee: row.get(3)?,
            balance: row.get(4)?,
            next_payment_date: NaiveDate::parse_from_str(&next_payment_str, DATE_FMT)
                .unwrap_or_default(),
            reminder_sent: row.get::<_, i64>(6)? != 0,
            active: row.get::<_, i64>(7)? != 0,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn row_to_campaign(row: &rusqlite::Row) -> rusqlite::Result<Campaign> {
        let created_at_str: String = row.get(6)?;

        Ok(Campaign {
            id: row.get(0)?,
            client_id: row.get(1)?,
            audience: row.get(2)?,
            location: row.get(3)?,
            contracted_quantity: row.get(4)?,
            active: row.get::<_, i64>(5)? != 0,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn row_to_lead(row: &rusqlite::Row) -> rusqlite::Result<Lead> {
        let status_str: String = row.get(6)?;
        let pain_points_json: String = row.get(8)?;
        let last_contact_str: Option<String> = row.get(13)?;
        let created_at_str: String = row.get(15)?;

        Ok(Lead {
            id: row.get(0)?,
            campaign_id: row.get(1)?,
            business_name: row.get(2)?,
            website: row.get(3)?,
            phone: row.get(4)?,
            email: row.get(5)?,
            status: LeadStatus::parse(&status_str).unwrap_or(LeadStatus::Hunted),
            discard_reason: row.get(7)?,
            pain_points: serde_json::from_str(&pain_points_json).unwrap_or_default(),
            quality_score: row.get(9)?,
            outreach_message: row.get(10)?,
            outreach_channel: row.get(11)?,
            nurture_step: row.get(12)?,
            last_contact_at: last_contact_str.map(|s| parse_timestamp(&s)),
            interaction_count: row.get(14)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn get_lead_inner(&self, conn: &Connection, id: &str) -> Result<Option<Lead>, CrmError> {
        let result = conn.query_row(
            &format!("{LEAD_SELECT} WHERE id = ?"),
            params![id],
            Self::row_to_lead,
        );
        match result {
            Ok(lead) => Ok(Some(lead)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CrmError::Database(e.to_string())),
        }
    }
}

const LEAD_SELECT: &str = "SELECT id, campaign_id, business_name, website, phone, email, status, \
     discard_reason, pain_points, quality_score, outreach_message, outreach_channel, \
     nurture_step, last_contact_at, interaction_count, created_at FROM leads";

const CLIENT_SELECT: &str = "SELECT id, name, email, monthly_fee, balance, next_payment_date, \
     reminder_sent, active, created_at FROM clients";

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl CrmStore for SqliteCrmStore {
    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    fn insert_client(&self, request: NewClient) -> Result<Client, CrmError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO clients (id, name, email, monthly_fee, balance, next_payment_date, reminder_sent, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 1, ?)",
            params![
                id,
                request.name,
                request.email,
                request.monthly_fee,
                request.balance,
                request.next_payment_date.format(DATE_FMT).to_string(),
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(Client {
            id,
            name: request.name,
            email: request.email,
            monthly_fee: request.monthly_fee,
            balance: request.balance,
            next_payment_date: request.next_payment_date,
            reminder_sent: false,
            active: true,
            created_at,
        })
    }

    fn get_client(&self, id: &str) -> Result<Option<Client>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("{CLIENT_SELECT} WHERE id = ?"),
            params![id],
            Self::row_to_client,
        );
        match result {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CrmError::Database(e.to_string())),
        }
    }

    fn list_active_clients(&self) -> Result<Vec<Client>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!("{CLIENT_SELECT} WHERE active = 1"))
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_client)
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(clients)
    }

    fn list_clients_due_reminder(
        &self,
        today: NaiveDate,
        window_days: i64,
    ) -> Result<Vec<Client>, CrmError> {
        let conn = self.conn.lock().unwrap();
        let horizon = today + Duration::days(window_days);

        let mut stmt = conn
            .prepare(&format!(
                "{CLIENT_SELECT} WHERE active = 1 AND reminder_sent = 0
                 AND next_payment_date > ? AND next_payment_date <= ?"
            ))
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![
                    today.format(DATE_FMT).to_string(),
                    horizon.format(DATE_FMT).to_string()
                ],
                Self::row_to_client,
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(clients)
    }

    fn mark_reminder_sent(&self, id: &str) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE clients SET reminder_sent = 1 WHERE id = ?",
                params![id],
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(CrmError::NotFound {
                kind: "client",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn list_clients_past_due(&self, today: NaiveDate) -> Result<Vec<Client>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "{CLIENT_SELECT} WHERE active = 1 AND next_payment_date <= ?"
            ))
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![today.format(DATE_FMT).to_string()],
                Self::row_to_client,
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(clients)
    }

    fn settle_client(&self, id: &str, period_days: i64) -> Result<Client, CrmError> {
        let conn = self.conn.lock().unwrap();

        // Debit, advance and clear the reminder flag as one guarded
        // statement, so a concurrent settlement can never double-charge.
        let changed = conn
            .execute(
                "UPDATE clients
                 SET balance = balance - monthly_fee,
                     next_payment_date = date(next_payment_date, '+' || ? || ' days'),
                     reminder_sent = 0
                 WHERE id = ? AND balance >= monthly_fee",
                params![period_days, id],
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return match conn.query_row(
                &format!("{CLIENT_SELECT} WHERE id = ?"),
                params![id],
                Self::row_to_client,
            ) {
                Ok(_) => Err(CrmError::InsufficientBalance(id.to_string())),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(CrmError::NotFound {
                    kind: "client",
                    id: id.to_string(),
                }),
                Err(e) => Err(CrmError::Database(e.to_string())),
            };
        }

        conn.query_row(
            &format!("{CLIENT_SELECT} WHERE id = ?"),
            params![id],
            Self::row_to_client,
        )
        .map_err(|e| CrmError::Database(e.to_string()))
    }

    fn suspend_client(&self, id: &str) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute("UPDATE clients SET active = 0 WHERE id = ?", params![id])
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(CrmError::NotFound {
                kind: "client",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    fn insert_campaign(&self, request: NewCampaign) -> Result<Campaign, CrmError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO campaigns (id, client_id, audience, location, contracted_quantity, active, created_at)
             VALUES (?, ?, ?, ?, ?, 1, ?)",
            params![
                id,
                request.client_id,
                request.audience,
                request.location,
                request.contracted_quantity,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(Campaign {
            id,
            client_id: request.client_id,
            audience: request.audience,
            location: request.location,
            contracted_quantity: request.contracted_quantity,
            active: true,
            created_at,
        })
    }

    fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT id, client_id, audience, location, contracted_quantity, active, created_at
             FROM campaigns WHERE id = ?",
            params![id],
            Self::row_to_campaign,
        );
        match result {
            Ok(campaign) => Ok(Some(campaign)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CrmError::Database(e.to_string())),
        }
    }

    fn list_runnable_campaigns(&self) -> Result<Vec<Campaign>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.client_id, c.audience, c.location, c.contracted_quantity, c.active, c.created_at
                 FROM campaigns c JOIN clients cl ON cl.id = c.client_id
                 WHERE c.active = 1 AND cl.active = 1
                 ORDER BY c.created_at",
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_campaign)
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut campaigns = Vec::new();
        for row in rows {
            campaigns.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(campaigns)
    }

    // ------------------------------------------------------------------
    // Leads
    // ------------------------------------------------------------------

    fn insert_lead(&self, request: NewLead) -> Result<Option<Lead>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let result = conn.execute(
            "INSERT INTO leads (id, campaign_id, business_name, website, phone, email, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'hunted', ?)",
            params![
                id,
                request.campaign_id,
                request.business_name,
                request.website,
                request.phone,
                request.email,
                created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(Some(Lead {
                id,
                campaign_id: request.campaign_id,
                business_name: request.business_name,
                website: request.website,
                phone: request.phone,
                email: request.email,
                status: LeadStatus::Hunted,
                discard_reason: None,
                pain_points: Vec::new(),
                quality_score: None,
                outreach_message: None,
                outreach_channel: None,
                nurture_step: 0,
                last_contact_at: None,
                interaction_count: 0,
                created_at,
            })),
            // Same business already hunted for this campaign.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(CrmError::Database(e.to_string())),
        }
    }

    fn get_lead(&self, id: &str) -> Result<Option<Lead>, CrmError> {
        let conn = self.conn.lock().unwrap();
        self.get_lead_inner(&conn, id)
    }

    fn count_leads_since(
        &self,
        campaign_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, CrmError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE campaign_id = ? AND created_at >= ?",
            params![campaign_id, since.to_rfc3339()],
            |row| row.get(0),
        )
        .map_err(|e| CrmError::Database(e.to_string()))
    }

    fn count_hunted_since(
        &self,
        campaign_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, CrmError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COUNT(*) FROM leads
             WHERE campaign_id = ? AND status = 'hunted' AND created_at >= ?",
            params![campaign_id, since.to_rfc3339()],
            |row| row.get(0),
        )
        .map_err(|e| CrmError::Database(e.to_string()))
    }

    fn list_leads_by_status(
        &self,
        campaign_id: &str,
        status: LeadStatus,
        limit: i64,
    ) -> Result<Vec<Lead>, CrmError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "{LEAD_SELECT} WHERE campaign_id = ? AND status = ? ORDER BY created_at LIMIT ?"
            ))
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![campaign_id, status.as_str(), limit],
                Self::row_to_lead,
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut leads = Vec::new();
        for row in rows {
            leads.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(leads)
    }

    fn list_leads_for_analysis(
        &self,
        campaign_id: &str,
        limit: i64,
    ) -> Result<Vec<Lead>, CrmError> {
        let conn = self.conn.lock().unwrap();

        // Hunted leads with an email skipped scouting and go straight to
        // the analyst.
        let mut stmt = conn
            .prepare(&format!(
                "{LEAD_SELECT} WHERE campaign_id = ?
                 AND (status = 'scouted' OR (status = 'hunted' AND email IS NOT NULL))
                 ORDER BY created_at LIMIT ?"
            ))
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![campaign_id, limit], Self::row_to_lead)
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut leads = Vec::new();
        for row in rows {
            leads.push(row.map_err(|e| CrmError::Database(e.to_string()))?);
        }
        Ok(leads)
    }

    fn update_status(&self, id: &str, to: LeadStatus) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let Some(lead) = self.get_lead_inner(&conn, id)? else {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        };
        if !lead.status.can_transition(to) {
            return Err(CrmError::InvalidTransition {
                from: lead.status,
                to,
            });
        }

        // Guard on the expected source status so two racing writers
        // cannot both apply a transition from the same state.
        conn.execute(
            "UPDATE leads SET status = ? WHERE id = ? AND status = ?",
            params![to.as_str(), id, lead.status.as_str()],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(())
    }

    fn set_scouted_email(&self, id: &str, email: Option<&str>) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute("UPDATE leads SET email = ? WHERE id = ?", params![email, id])
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn set_qualification(
        &self,
        id: &str,
        status: LeadStatus,
        discard_reason: Option<&str>,
        pain_points: &[String],
        quality_score: Option<i64>,
    ) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let Some(lead) = self.get_lead_inner(&conn, id)? else {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        };
        if !lead.status.can_transition(status) {
            return Err(CrmError::InvalidTransition {
                from: lead.status,
                to: status,
            });
        }

        let pain_points_json =
            serde_json::to_string(pain_points).map_err(|e| CrmError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE leads
             SET status = ?, discard_reason = ?, pain_points = ?, quality_score = ?
             WHERE id = ? AND status = ?",
            params![
                status.as_str(),
                discard_reason,
                pain_points_json,
                quality_score,
                id,
                lead.status.as_str(),
            ],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(())
    }

    fn set_outreach(
        &self,
        id: &str,
        message: &str,
        channel: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let Some(lead) = self.get_lead_inner(&conn, id)? else {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        };
        if !lead.status.can_transition(LeadStatus::Persuaded) {
            return Err(CrmError::InvalidTransition {
                from: lead.status,
                to: LeadStatus::Persuaded,
            });
        }

        conn.execute(
            "UPDATE leads
             SET status = 'persuaded', outreach_message = ?, outreach_channel = ?,
                 last_contact_at = ?, nurture_step = 1
             WHERE id = ? AND status = ?",
            params![message, channel, at.to_rfc3339(), id, lead.status.as_str()],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(())
    }

    fn set_nurture_state(&self, id: &str, step: i64, at: DateTime<Utc>) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE leads SET nurture_step = ?, last_contact_at = ? WHERE id = ?",
                params![step, at.to_rfc3339(), id],
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn capture(&self, id: &str, email: Option<&str>) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let Some(lead) = self.get_lead_inner(&conn, id)? else {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        };
        if !lead.status.can_transition(LeadStatus::Nurturing) {
            return Err(CrmError::InvalidTransition {
                from: lead.status,
                to: LeadStatus::Nurturing,
            });
        }

        conn.execute(
            "UPDATE leads
             SET status = 'nurturing', email = COALESCE(?, email)
             WHERE id = ? AND status = ?",
            params![email, id, lead.status.as_str()],
        )
        .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(())
    }

    fn record_interaction(&self, id: &str) -> Result<(), CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE leads SET interaction_count = interaction_count + 1 WHERE id = ?",
                params![id],
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(CrmError::NotFound {
                kind: "lead",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn promote_billable(
        &self,
        campaign_id: &str,
        min_interactions: i64,
    ) -> Result<i64, CrmError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE leads SET status = 'validated_billable'
                 WHERE campaign_id = ? AND status = 'nurturing' AND interaction_count >= ?",
                params![campaign_id, min_interactions],
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;

        Ok(changed as i64)
    }

    fn pipeline_counts(
        &self,
        client_id: &str,
        since: DateTime<Utc>,
    ) -> Result<PipelineCounts, CrmError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT l.status, COUNT(*)
                 FROM leads l JOIN campaigns c ON c.id = l.campaign_id
                 WHERE c.client_id = ? AND l.created_at >= ?
                 GROUP BY l.status",
            )
            .map_err(|e| CrmError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![client_id, since.to_rfc3339()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| CrmError::Database(e.to_string()))?;

        let mut counts = PipelineCounts::default();
        for row in rows {
            let (status, n) = row.map_err(|e| CrmError::Database(e.to_string()))?;
            counts.hunted += n;
            match LeadStatus::parse(&status) {
                Some(LeadStatus::Qualified) => counts.qualified += n,
                Some(LeadStatus::Persuaded) => counts.persuaded += n,
                Some(LeadStatus::Nurturing) => counts.nurturing += n,
                Some(LeadStatus::ValidatedBillable) => counts.billable += n,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteCrmStore {
        SqliteCrmStore::in_memory().unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn add_client(store: &SqliteCrmStore, balance: f64, due: &str) -> Client {
        store
            .insert_client(NewClient {
                name: "Acme Dental".to_string(),
                email: "billing@acme.test".to_string(),
                monthly_fee: 400.0,
                balance,
                next_payment_date: day(due),
            })
            .unwrap()
    }

    fn add_campaign(store: &SqliteCrmStore, client_id: &str) -> Campaign {
        store
            .insert_campaign(NewCampaign {
                client_id: client_id.to_string(),
                audience: "dental clinics".to_string(),
                location: "Madrid".to_string(),
                contracted_quantity: 100,
            })
            .unwrap()
    }

    fn add_lead(store: &SqliteCrmStore, campaign_id: &str, name: &str) -> Lead {
        store
            .insert_lead(NewLead {
                campaign_id: campaign_id.to_string(),
                business_name: name.to_string(),
                website: Some(format!("https://{name}.test")),
                phone: None,
                email: None,
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_insert_lead_dedups_by_business_name() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);

        assert!(add_lead(&store, &campaign.id, "clinic-a").id.len() > 0);
        let dup = store
            .insert_lead(NewLead {
                campaign_id: campaign.id.clone(),
                business_name: "clinic-a".to_string(),
                website: None,
                phone: None,
                email: None,
            })
            .unwrap();
        assert!(dup.is_none());

        // Same name in a different campaign is a different prospect.
        let other = add_campaign(&store, &client.id);
        assert!(store
            .insert_lead(NewLead {
                campaign_id: other.id,
                business_name: "clinic-a".to_string(),
                website: None,
                phone: None,
                email: None,
            })
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_update_status_enforces_state_machine() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        let lead = add_lead(&store, &campaign.id, "clinic-a");

        store.update_status(&lead.id, LeadStatus::Scouted).unwrap();

        let result = store.update_status(&lead.id, LeadStatus::Hunted);
        assert!(matches!(result, Err(CrmError::InvalidTransition { .. })));

        let result = store.update_status(&lead.id, LeadStatus::Persuaded);
        assert!(matches!(result, Err(CrmError::InvalidTransition { .. })));
    }

    /// Walk a fresh lead to `target` along legal edges only.
    fn drive_to(store: &SqliteCrmStore, lead_id: &str, target: LeadStatus) {
        use LeadStatus::*;
        let path: &[LeadStatus] = match target {
            Hunted => &[],
            Scouted => &[Scouted],
            Qualified => &[Scouted, Qualified],
            Discarded => &[Scouted, Discarded],
            Persuaded => &[Scouted, Qualified, Persuaded],
            ContactFailed => &[Scouted, Qualified, ContactFailed],
            Nurturing => &[Scouted, Qualified, Persuaded, Nurturing],
            Cold => &[Scouted, Qualified, Persuaded, Nurturing, Cold],
            ValidatedBillable => {
                &[Scouted, Qualified, Persuaded, Nurturing, ValidatedBillable]
            }
        };
        for step in path {
            store.update_status(lead_id, *step).unwrap();
        }
    }

    #[test]
    fn test_update_status_covers_full_transition_matrix() {
        use LeadStatus::*;
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        let all = [
            Hunted,
            Scouted,
            Qualified,
            Discarded,
            Persuaded,
            ContactFailed,
            Nurturing,
            Cold,
            ValidatedBillable,
        ];

        // One fresh lead per (from, to) pair: the store must accept the
        // update exactly when the state machine allows the edge, and an
        // illegal attempt must leave the row untouched.
        for (i, from) in all.iter().enumerate() {
            for (j, to) in all.iter().enumerate() {
                let lead = add_lead(&store, &campaign.id, &format!("biz-{i}-{j}"));
                drive_to(&store, &lead.id, *from);

                let result = store.update_status(&lead.id, *to);
                if from.can_transition(*to) {
                    assert!(result.is_ok(), "{from:?} -> {to:?} rejected");
                    let row = store.get_lead(&lead.id).unwrap().unwrap();
                    assert_eq!(row.status, *to);
                } else {
                    assert!(
                        matches!(result, Err(CrmError::InvalidTransition { .. })),
                        "{from:?} -> {to:?} accepted"
                    );
                    let row = store.get_lead(&lead.id).unwrap().unwrap();
                    assert_eq!(row.status, *from, "{from:?} moved on rejection");
                }
            }
        }
    }

    #[test]
    fn test_settle_client_debits_and_advances() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");

        store.mark_reminder_sent(&client.id).unwrap();
        let settled = store.settle_client(&client.id, 30).unwrap();

        assert_eq!(settled.balance, 600.0);
        assert_eq!(settled.next_payment_date, day("2025-05-01"));
        assert!(!settled.reminder_sent);
    }

    #[test]
    fn test_settle_client_insufficient_balance() {
        let store = store();
        let client = add_client(&store, 100.0, "2025-04-01");

        let result = store.settle_client(&client.id, 30);
        assert!(matches!(result, Err(CrmError::InsufficientBalance(_))));

        // Nothing changed.
        let row = store.get_client(&client.id).unwrap().unwrap();
        assert_eq!(row.balance, 100.0);
        assert_eq!(row.next_payment_date, day("2025-04-01"));
    }

    #[test]
    fn test_reminder_listing_window() {
        let store = store();
        let soon = add_client(&store, 1000.0, "2025-04-03");
        let far = add_client(&store, 1000.0, "2025-04-20");

        let due = store
            .list_clients_due_reminder(day("2025-04-01"), 3)
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, soon.id);

        // Reminded clients drop out of the listing.
        store.mark_reminder_sent(&soon.id).unwrap();
        assert!(store
            .list_clients_due_reminder(day("2025-04-01"), 3)
            .unwrap()
            .is_empty());
        let _ = far;
    }

    #[test]
    fn test_past_due_listing() {
        let store = store();
        let overdue = add_client(&store, 1000.0, "2025-04-01");
        add_client(&store, 1000.0, "2025-04-10");

        let past_due = store.list_clients_past_due(day("2025-04-01")).unwrap();
        assert_eq!(past_due.len(), 1);
        assert_eq!(past_due[0].id, overdue.id);
    }

    #[test]
    fn test_runnable_campaigns_require_active_client() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        add_campaign(&store, &client.id);

        assert_eq!(store.list_runnable_campaigns().unwrap().len(), 1);

        store.suspend_client(&client.id).unwrap();
        assert!(store.list_runnable_campaigns().unwrap().is_empty());
    }

    #[test]
    fn test_leads_for_analysis_includes_hunted_with_email() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);

        let scouted = add_lead(&store, &campaign.id, "clinic-a");
        store.update_status(&scouted.id, LeadStatus::Scouted).unwrap();

        let with_email = store
            .insert_lead(NewLead {
                campaign_id: campaign.id.clone(),
                business_name: "clinic-b".to_string(),
                website: None,
                phone: None,
                email: Some("hi@clinic-b.test".to_string()),
            })
            .unwrap()
            .unwrap();

        // Plain hunted without email must wait for the scout.
        add_lead(&store, &campaign.id, "clinic-c");

        let batch = store.list_leads_for_analysis(&campaign.id, 10).unwrap();
        let ids: Vec<_> = batch.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(batch.len(), 2);
        assert!(ids.contains(&scouted.id.as_str()));
        assert!(ids.contains(&with_email.id.as_str()));
    }

    #[test]
    fn test_capture_moves_to_nurturing_and_keeps_existing_email() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        let lead = add_lead(&store, &campaign.id, "clinic-a");

        store.update_status(&lead.id, LeadStatus::Scouted).unwrap();
        store.set_scouted_email(&lead.id, Some("found@clinic-a.test")).unwrap();
        store.update_status(&lead.id, LeadStatus::Qualified).unwrap();
        store
            .set_outreach(&lead.id, "hello", "email", Utc::now())
            .unwrap();

        store.capture(&lead.id, None).unwrap();
        let row = store.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Nurturing);
        assert_eq!(row.email.as_deref(), Some("found@clinic-a.test"));
    }

    #[test]
    fn test_capture_requires_persuaded() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        let lead = add_lead(&store, &campaign.id, "clinic-a");

        let result = store.capture(&lead.id, Some("reply@clinic-a.test"));
        assert!(matches!(result, Err(CrmError::InvalidTransition { .. })));
    }

    #[test]
    fn test_promote_billable_threshold() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);

        for (name, replies) in [("clinic-a", 3), ("clinic-b", 1)] {
            let lead = add_lead(&store, &campaign.id, name);
            store.update_status(&lead.id, LeadStatus::Scouted).unwrap();
            store.update_status(&lead.id, LeadStatus::Qualified).unwrap();
            store
                .set_outreach(&lead.id, "hello", "email", Utc::now())
                .unwrap();
            store.capture(&lead.id, None).unwrap();
            for _ in 0..replies {
                store.record_interaction(&lead.id).unwrap();
            }
        }

        let promoted = store.promote_billable(&campaign.id, 3).unwrap();
        assert_eq!(promoted, 1);

        let billable = store
            .list_leads_by_status(&campaign.id, LeadStatus::ValidatedBillable, 10)
            .unwrap();
        assert_eq!(billable.len(), 1);
        assert_eq!(billable[0].business_name, "clinic-a");
    }

    #[test]
    fn test_set_outreach_stamps_first_step() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        let lead = add_lead(&store, &campaign.id, "clinic-a");

        store.update_status(&lead.id, LeadStatus::Scouted).unwrap();
        store.update_status(&lead.id, LeadStatus::Qualified).unwrap();
        let at = Utc::now();
        store.set_outreach(&lead.id, "hi there", "email", at).unwrap();

        let row = store.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(row.status, LeadStatus::Persuaded);
        assert_eq!(row.nurture_step, 1);
        assert_eq!(row.outreach_channel.as_deref(), Some("email"));
        assert!(row.last_contact_at.is_some());
    }

    #[test]
    fn test_count_leads_since() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        add_lead(&store, &campaign.id, "clinic-a");
        add_lead(&store, &campaign.id, "clinic-b");

        let long_ago = Utc::now() - Duration::days(30);
        assert_eq!(store.count_leads_since(&campaign.id, long_ago).unwrap(), 2);
        let future = Utc::now() + Duration::days(1);
        assert_eq!(store.count_leads_since(&campaign.id, future).unwrap(), 0);
    }

    #[test]
    fn test_count_hunted_since_ignores_advanced_leads() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);
        add_lead(&store, &campaign.id, "clinic-a");
        let scouted = add_lead(&store, &campaign.id, "clinic-b");
        store.update_status(&scouted.id, LeadStatus::Scouted).unwrap();

        let long_ago = Utc::now() - Duration::days(30);
        // The any-status count keeps both, the hunted count drops the
        // one the pipeline already picked up.
        assert_eq!(store.count_leads_since(&campaign.id, long_ago).unwrap(), 2);
        assert_eq!(store.count_hunted_since(&campaign.id, long_ago).unwrap(), 1);
    }

    #[test]
    fn test_pipeline_counts() {
        let store = store();
        let client = add_client(&store, 1000.0, "2025-04-01");
        let campaign = add_campaign(&store, &client.id);

        let qualified = add_lead(&store, &campaign.id, "clinic-a");
        store.update_status(&qualified.id, LeadStatus::Scouted).unwrap();
        store.update_status(&qualified.id, LeadStatus::Qualified).unwrap();
        add_lead(&store, &campaign.id, "clinic-b");

        let since = Utc::now() - Duration::days(1);
        let counts = store.pipeline_counts(&client.id, since).unwrap();
        assert_eq!(counts.hunted, 2);
        assert_eq!(counts.qualified, 1);
        assert_eq!(counts.billable, 0);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("crm.db");

        let store = SqliteCrmStore::new(&db_path).unwrap();
        let client = add_client(&store, 500.0, "2025-04-01");

        assert!(db_path.exists());
        assert!(store.get_client(&client.id).unwrap().is_some());
    }
}
