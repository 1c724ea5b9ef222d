//! Insert-once record of outbound notifications.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use cb_core::error::{CbError, CbResult};

/// Tracks which `(kind, target)` notifications a business already sent.
pub struct NotificationTracker;

impl NotificationTracker {
    /// Claim a notification slot. Returns `false` if it was already claimed.
    pub fn claim(
        conn: &Connection,
        business_id: i64,
        kind: &str,
        target_key: &str,
        at: DateTime<Utc>,
    ) -> CbResult<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO notification_tracker (business_id, kind, target_key, sent_at)
                 VALUES (?1,?2,?3,?4)",
                params![business_id, kind, target_key, at],
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(inserted > 0)
    }

    /// Give a claim back, so a failed send can be retried by the next sweep.
    pub fn release(conn: &Connection, business_id: i64, kind: &str, target_key: &str) -> CbResult<()> {
        conn.execute(
            "DELETE FROM notification_tracker WHERE business_id = ?1 AND kind = ?2 AND target_key = ?3",
            params![business_id, kind, target_key],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn was_sent(conn: &Connection, business_id: i64, kind: &str, target_key: &str) -> CbResult<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notification_tracker
                 WHERE business_id = ?1 AND kind = ?2 AND target_key = ?3",
                params![business_id, kind, target_key],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::business::Business;
    use crate::schema;

    #[test]
    fn test_claim_once() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let bid = Business::new("Notify").save(&conn).unwrap();

        assert!(NotificationTracker::claim(&conn, bid, "payment_reminder", "BKabc12", Utc::now()).unwrap());
        assert!(!NotificationTracker::claim(&conn, bid, "payment_reminder", "BKabc12", Utc::now()).unwrap());
        assert!(NotificationTracker::claim(&conn, bid, "appointment_reminder", "BKabc12", Utc::now()).unwrap());
        assert!(NotificationTracker::was_sent(&conn, bid, "payment_reminder", "BKabc12").unwrap());

        NotificationTracker::release(&conn, bid, "payment_reminder", "BKabc12").unwrap();
        assert!(!NotificationTracker::was_sent(&conn, bid, "payment_reminder", "BKabc12").unwrap());
    }
}
