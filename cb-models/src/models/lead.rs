//! Lead entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::constants::id_prefix;
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

/// A prospective customer captured from a form, an ad, or a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Option<i64>,
    pub lead_id: String,
    pub business_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub notes: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
    /// When the outreach message went out.
    pub email_sent_at: Option<DateTime<Utc>>,
    pub is_converted: bool,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(business_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            lead_id: String::new(),
            business_id,
            name: name.into(),
            email: None,
            phone_number: None,
            notes: None,
            content: None,
            source: None,
            email_sent_at: None,
            is_converted: false,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            lead_id: row.get("lead_id")?,
            business_id: row.get("business_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            phone_number: row.get("phone_number")?,
            notes: row.get("notes")?,
            content: row.get("content")?,
            source: row.get("source")?,
            email_sent_at: row.get("email_sent_at")?,
            is_converted: row.get::<_, i32>("is_converted")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_lead_id(conn: &Connection, lead_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM leads WHERE lead_id = ?1", [lead_id], Self::from_row) {
            Ok(l) => Ok(Some(l)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Record that outreach was sent.
    pub fn mark_contacted(conn: &Connection, id: i64, at: DateTime<Utc>) -> CbResult<()> {
        conn.execute("UPDATE leads SET email_sent_at = ?1 WHERE id = ?2", params![at, id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.lead_id.is_empty() {
            self.lead_id = generate_id(id_prefix::LEAD);
        }

        conn.execute(
            "INSERT INTO leads (
                lead_id, business_id, name, email, phone_number, notes, content,
                source, email_sent_at, is_converted, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
            ON CONFLICT(lead_id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone_number = excluded.phone_number,
                notes = excluded.notes,
                content = excluded.content,
                source = excluded.source,
                email_sent_at = excluded.email_sent_at,
                is_converted = excluded.is_converted",
            params![
                self.lead_id,
                self.business_id,
                self.name,
                self.email,
                self.phone_number,
                self.notes,
                self.content,
                self.source,
                self.email_sent_at,
                self.is_converted as i32,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row("SELECT id FROM leads WHERE lead_id = ?1", [&self.lead_id], |row| row.get(0))
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::business::Business;
    use crate::schema;

    #[test]
    fn test_lead_id_generated_once() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let bid = Business::new("Leads").save(&conn).unwrap();

        let mut lead = Lead::new(bid, "Pat");
        let id = lead.save(&conn).unwrap();
        let lead_id = lead.lead_id.clone();
        assert!(lead_id.starts_with("LD"));

        lead.is_converted = true;
        assert_eq!(lead.save(&conn).unwrap(), id);
        assert_eq!(lead.lead_id, lead_id);

        let loaded = Lead::find_by_lead_id(&conn, &lead_id).unwrap().unwrap();
        assert!(loaded.is_converted);
        assert!(loaded.email_sent_at.is_none());
    }

    #[test]
    fn test_mark_contacted() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let bid = Business::new("Leads").save(&conn).unwrap();
        let mut lead = Lead::new(bid, "Sam");
        let id = lead.save(&conn).unwrap();

        Lead::mark_contacted(&conn, id, Utc::now()).unwrap();
        let loaded = Lead::find_by_lead_id(&conn, &lead.lead_id).unwrap().unwrap();
        assert!(loaded.email_sent_at.is_some());
    }
}
