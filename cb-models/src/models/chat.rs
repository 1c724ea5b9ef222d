//! Agent chat sessions and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::constants::id_prefix;
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

/// One customer conversation with the booking agent.
///
/// A chat is keyed by business plus client key, which is the customer's
/// phone number for SMS or a session key for web chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Option<i64>,
    pub chat_id: String,
    pub business_id: i64,
    pub client_key: String,
    /// Booking fields extracted so far, as a JSON object.
    pub summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(business_id: i64, client_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            chat_id: String::new(),
            business_id,
            client_key: client_key.into(),
            summary: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let summary: String = row.get("summary")?;
        Ok(Self {
            id: row.get("id")?,
            chat_id: row.get("chat_id")?,
            business_id: row.get("business_id")?,
            client_key: row.get("client_key")?,
            summary: serde_json::from_str(&summary).unwrap_or_else(|_| serde_json::json!({})),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    pub fn find_by_chat_id(conn: &Connection, chat_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM chats WHERE chat_id = ?1", [chat_id], Self::from_row) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn find_by_client(conn: &Connection, business_id: i64, client_key: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM chats WHERE business_id = ?1 AND client_key = ?2",
            params![business_id, client_key],
            Self::from_row,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Delete a chat and its messages.
    pub fn delete(conn: &Connection, id: i64) -> CbResult<bool> {
        let changed = conn
            .execute("DELETE FROM chats WHERE id = ?1", [id])
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    /// All messages, oldest first.
    pub fn messages(&self, conn: &Connection) -> CbResult<Vec<ChatMessage>> {
        match self.id {
            Some(id) => ChatMessage::list_for_chat(conn, id),
            None => Ok(Vec::new()),
        }
    }

    /// A string field of the summary, if present and non-empty.
    pub fn summary_str(&self, key: &str) -> Option<&str> {
        self.summary
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.chat_id.is_empty() {
            self.chat_id = generate_id(id_prefix::CHAT);
        }
        self.updated_at = Utc::now();
        let summary = serde_json::to_string(&self.summary)?;

        conn.execute(
            "INSERT INTO chats (chat_id, business_id, client_key, summary, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(business_id, client_key) DO UPDATE SET
                summary = excluded.summary,
                updated_at = excluded.updated_at",
            params![
                self.chat_id,
                self.business_id,
                self.client_key,
                summary,
                self.created_at,
                self.updated_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let (real_id, chat_id): (i64, String) = conn
            .query_row(
                "SELECT id, chat_id FROM chats WHERE business_id = ?1 AND client_key = ?2",
                params![self.business_id, self.client_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        self.chat_id = chat_id;
        Ok(real_id)
    }
}

/// One stored turn of a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<i64>,
    pub chat_id: i64,
    /// `user`, `assistant` or `tool`.
    pub role: String,
    pub message: String,
    pub is_first_message: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: i64, role: &str, message: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id,
            role: role.to_string(),
            message: message.into(),
            is_first_message: false,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            chat_id: row.get("chat_id")?,
            role: row.get("role")?,
            message: row.get("message")?,
            is_first_message: row.get::<_, i32>("is_first_message")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn list_for_chat(conn: &Connection, chat_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM chat_messages WHERE chat_id = ?1 ORDER BY id")
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([chat_id], Self::from_row)
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    pub fn count_for_chat(conn: &Connection, chat_id: i64) -> CbResult<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE chat_id = ?1",
            [chat_id],
            |row| row.get(0),
        )
        .map_err(|e| CbError::Database(e.to_string()))
    }

    /// Messages are append-only.
    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if let Some(id) = self.id {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO chat_messages (chat_id, role, message, is_first_message, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                self.chat_id,
                self.role,
                self.message,
                self.is_first_message as i32,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }
}
