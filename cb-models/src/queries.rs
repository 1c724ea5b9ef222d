//! Query builders for common list and report access patterns.
//!
//! Single-record lookups live on the models; this module holds the
//! filtered, multi-row queries used by services and the CLI. All queries use
//! parameterized SQL and return domain model types.

use std::collections::HashMap;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use cb_core::error::{CbError, CbResult};

use crate::models::booking::Booking;
use crate::models::business::Business;
use crate::models::chat::Chat;
use crate::models::cleaner::{Cleaner, CleanerAvailability};
use crate::models::invoice::Invoice;
use crate::models::lead::Lead;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

// ─── Business Queries ───────────────────────────────────────────────────────

/// All businesses, oldest first.
pub fn list_businesses(conn: &Connection) -> CbResult<Vec<Business>> {
    let mut stmt = conn
        .prepare("SELECT * FROM businesses ORDER BY id")
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], Business::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

/// Headline numbers for one business.
#[derive(Debug, Clone, Default)]
pub struct BusinessSummary {
    pub cleaners: i64,
    pub customers: i64,
    pub leads: i64,
    pub bookings: i64,
    pub cancelled_bookings: i64,
    pub unpaid_invoices: i64,
    pub collected: f64,
    pub outstanding: f64,
}

pub fn business_summary(conn: &Connection, business_id: i64) -> CbResult<BusinessSummary> {
    let count = |sql: &str| -> CbResult<i64> {
        conn.query_row(sql, [business_id], |row| row.get(0))
            .map_err(|e| CbError::Database(e.to_string()))
    };
    let sum = |sql: &str| -> CbResult<f64> {
        conn.query_row(sql, [business_id], |row| row.get(0))
            .map_err(|e| CbError::Database(e.to_string()))
    };

    Ok(BusinessSummary {
        cleaners: count("SELECT COUNT(*) FROM cleaners WHERE business_id = ?1 AND is_active = 1")?,
        customers: count("SELECT COUNT(*) FROM customers WHERE business_id = ?1")?,
        leads: count("SELECT COUNT(*) FROM leads WHERE business_id = ?1")?,
        bookings: count("SELECT COUNT(*) FROM bookings WHERE business_id = ?1 AND cancelled_at IS NULL")?,
        cancelled_bookings: count(
            "SELECT COUNT(*) FROM bookings WHERE business_id = ?1 AND cancelled_at IS NOT NULL",
        )?,
        unpaid_invoices: count(
            "SELECT COUNT(*) FROM invoices i JOIN bookings b ON b.id = i.booking_id
             WHERE b.business_id = ?1 AND i.is_paid = 0 AND b.cancelled_at IS NULL",
        )?,
        collected: sum(
            "SELECT COALESCE(SUM(p.amount), 0) FROM payments p
             JOIN invoices i ON i.id = p.invoice_id
             JOIN bookings b ON b.id = i.booking_id
             WHERE b.business_id = ?1 AND p.status = 'COMPLETED'",
        )?,
        outstanding: sum(
            "SELECT COALESCE(SUM(i.amount), 0) FROM invoices i JOIN bookings b ON b.id = i.booking_id
             WHERE b.business_id = ?1 AND i.is_paid = 0 AND b.cancelled_at IS NULL",
        )?,
    })
}

// ─── Cleaner Queries ────────────────────────────────────────────────────────

/// Cleaners of a business in creation order.
pub fn list_cleaners(conn: &Connection, business_id: i64, active_only: bool) -> CbResult<Vec<Cleaner>> {
    let filter = if active_only { "AND is_active = 1" } else { "" };
    let sql = format!("SELECT * FROM cleaners WHERE business_id = ?1 {filter} ORDER BY id");
    let mut stmt = conn.prepare(&sql).map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([business_id], Cleaner::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

/// Availability rows of all active cleaners of a business, grouped by cleaner id.
pub fn availability_by_cleaner(
    conn: &Connection,
    business_id: i64,
) -> CbResult<HashMap<i64, Vec<CleanerAvailability>>> {
    let mut stmt = conn
        .prepare(
            "SELECT a.* FROM cleaner_availability a
             JOIN cleaners c ON c.id = a.cleaner_id
             WHERE c.business_id = ?1 AND c.is_active = 1
             ORDER BY a.id",
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([business_id], CleanerAvailability::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;

    let mut map: HashMap<i64, Vec<CleanerAvailability>> = HashMap::new();
    for row in rows {
        let slot = row.map_err(|e| CbError::Database(e.to_string()))?;
        map.entry(slot.cleaner_id).or_default().push(slot);
    }
    Ok(map)
}

// ─── Booking Queries ────────────────────────────────────────────────────────

/// Filter for [`list_bookings`].
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub business_id: Option<i64>,
    pub cleaner_id: Option<i64>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub include_cancelled: bool,
    pub include_completed: bool,
    pub direction: SortDirection,
    pub limit: Option<i64>,
}

impl BookingFilter {
    /// Live (not cancelled) bookings of one business, completed ones included.
    pub fn live_for_business(business_id: i64) -> Self {
        Self {
            business_id: Some(business_id),
            include_completed: true,
            ..Self::default()
        }
    }
}

/// List bookings ordered by appointment date and start time.
pub fn list_bookings(conn: &Connection, filter: &BookingFilter) -> CbResult<Vec<Booking>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(id) = filter.business_id {
        params.push(Box::new(id));
        clauses.push(format!("business_id = ?{}", params.len()));
    }
    if let Some(id) = filter.cleaner_id {
        params.push(Box::new(id));
        clauses.push(format!("cleaner_id = ?{}", params.len()));
    }
    if let Some(from) = filter.from_date {
        params.push(Box::new(from));
        clauses.push(format!("cleaning_date >= ?{}", params.len()));
    }
    if let Some(to) = filter.to_date {
        params.push(Box::new(to));
        clauses.push(format!("cleaning_date <= ?{}", params.len()));
    }
    if !filter.include_cancelled {
        clauses.push("cancelled_at IS NULL".into());
    }
    if !filter.include_completed {
        clauses.push("is_completed = 0".into());
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let limit_clause = filter.limit.map(|l| format!("LIMIT {l}")).unwrap_or_default();
    let dir = filter.direction.as_sql();
    let sql = format!(
        "SELECT * FROM bookings {where_clause} ORDER BY cleaning_date {dir}, start_time {dir}, id {dir} {limit_clause}"
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| CbError::Database(e.to_string()))?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), Booking::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

/// Live bookings paired with their unpaid invoice, across all businesses.
pub fn list_unpaid_bookings(conn: &Connection) -> CbResult<Vec<(Booking, Invoice)>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.*, i.id AS inv_id, i.invoice_id AS inv_invoice_id, i.amount AS inv_amount,
                    i.is_paid AS inv_is_paid, i.created_at AS inv_created_at
             FROM bookings b
             JOIN invoices i ON i.booking_id = b.id
             WHERE i.is_paid = 0 AND b.cancelled_at IS NULL AND b.is_completed = 0
             ORDER BY b.created_at",
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            let booking = Booking::from_row(row)?;
            let invoice = Invoice {
                id: row.get("inv_id")?,
                invoice_id: row.get("inv_invoice_id")?,
                booking_id: booking.id.unwrap_or_default(),
                amount: row.get("inv_amount")?,
                is_paid: row.get::<_, i32>("inv_is_paid")? != 0,
                created_at: row.get("inv_created_at")?,
            };
            Ok((booking, invoice))
        })
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

/// Completed, not cancelled bookings dated within `[from, to]`, across all businesses.
pub fn list_completed_bookings(conn: &Connection, from: NaiveDate, to: NaiveDate) -> CbResult<Vec<Booking>> {
    let bookings = list_bookings(
        conn,
        &BookingFilter {
            from_date: Some(from),
            to_date: Some(to),
            include_completed: true,
            ..BookingFilter::default()
        },
    )?;
    Ok(bookings.into_iter().filter(|b| b.is_completed).collect())
}

/// Live, not yet completed bookings dated within `[from, to]`, across all businesses.
pub fn list_upcoming_bookings(conn: &Connection, from: NaiveDate, to: NaiveDate) -> CbResult<Vec<Booking>> {
    list_bookings(
        conn,
        &BookingFilter {
            from_date: Some(from),
            to_date: Some(to),
            ..BookingFilter::default()
        },
    )
}

// ─── Lead Queries ──────────────────────────────────────────────

/// Leads that were texted and have not converted, across all businesses,
/// earliest outreach first.
pub fn list_contacted_leads(conn: &Connection) -> CbResult<Vec<Lead>> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM leads WHERE is_converted = 0 AND email_sent_at IS NOT NULL
             ORDER BY email_sent_at, id",
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], Lead::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

/// Leads of a business, newest first.
pub fn list_leads(conn: &Connection, business_id: i64, include_converted: bool, limit: i64) -> CbResult<Vec<Lead>> {
    let filter = if include_converted { "" } else { "AND is_converted = 0" };
    let sql = format!(
        "SELECT * FROM leads WHERE business_id = ?1 {filter} ORDER BY created_at DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map(params![business_id, limit], Lead::from_row)
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

// ─── Chat Queries ───────────────────────────────────────────────────────────

/// Chat with computed fields from a join query.
#[derive(Debug, Clone)]
pub struct ChatWithDetails {
    pub chat: Chat,
    pub message_count: i64,
    pub last_message: Option<String>,
    pub last_role: Option<String>,
}

/// Chats of a business, most recently updated first.
pub fn list_chats_with_details(conn: &Connection, business_id: i64, limit: i64) -> CbResult<Vec<ChatWithDetails>> {
    let mut stmt = conn
        .prepare(
            "SELECT c.*,
                COALESCE((SELECT COUNT(*) FROM chat_messages m WHERE m.chat_id = c.id), 0) AS message_count,
                lm.message AS last_message,
                lm.role AS last_role
             FROM chats c
             LEFT JOIN chat_messages lm ON lm.id = (
                SELECT m.id FROM chat_messages m WHERE m.chat_id = c.id ORDER BY m.id DESC LIMIT 1
             )
             WHERE c.business_id = ?1
             ORDER BY c.updated_at DESC, c.id DESC
             LIMIT ?2",
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
    let rows = stmt
        .query_map(params![business_id, limit], |row| {
            Ok(ChatWithDetails {
                chat: Chat::from_row(row)?,
                message_count: row.get("message_count")?,
                last_message: row.get("last_message")?,
                last_role: row.get("last_role")?,
            })
        })
        .map_err(|e| CbError::Database(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| CbError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc, Weekday};
    use cb_core::constants::role;
    use crate::models::chat::ChatMessage;
    use crate::schema;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        schema::create_tables(&conn).unwrap();
        let bid = Business::new("Queries").save(&conn).unwrap();
        (conn, bid)
    }

    fn booking(conn: &Connection, bid: i64, day: u32, hour: u32) -> Booking {
        let mut b = Booking::new(
            bid,
            "Ana",
            NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
        );
        b.save(conn).unwrap();
        b
    }

    #[test]
    fn test_list_bookings_filters_and_orders() {
        let (conn, bid) = setup();
        booking(&conn, bid, 3, 14);
        booking(&conn, bid, 3, 9);
        let mut cancelled = booking(&conn, bid, 4, 9);
        cancelled.cancelled_at = Some(Utc::now());
        cancelled.save(&conn).unwrap();
        booking(&conn, bid, 10, 9);

        let filter = BookingFilter {
            to_date: NaiveDate::from_ymd_opt(2025, 6, 5),
            ..BookingFilter::live_for_business(bid)
        };
        let rows = list_bookings(&conn, &filter).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());

        let all = list_bookings(
            &conn,
            &BookingFilter {
                include_cancelled: true,
                direction: SortDirection::Desc,
                ..BookingFilter::live_for_business(bid)
            },
        )
        .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].cleaning_date.to_string(), "2025-06-10");
    }

    #[test]
    fn test_unpaid_bookings() {
        let (conn, bid) = setup();
        let b = booking(&conn, bid, 3, 9);
        let mut inv = Invoice::new(b.id.unwrap(), 80.0);
        inv.save(&conn).unwrap();

        let unpaid = list_unpaid_bookings(&conn).unwrap();
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].1.invoice_id, inv.invoice_id);
        assert_eq!(unpaid[0].1.amount, 80.0);
    }

    #[test]
    fn test_availability_grouped() {
        let (conn, bid) = setup();
        let mut jo = Cleaner::new(bid, "Jo");
        let jo_id = jo.save(&conn).unwrap();
        let mut inactive = Cleaner::new(bid, "Off");
        inactive.is_active = false;
        let off_id = inactive.save(&conn).unwrap();
        for cid in [jo_id, off_id] {
            CleanerAvailability::new(
                cid,
                Weekday::Mon,
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            )
            .save(&conn)
            .unwrap();
        }

        let map = availability_by_cleaner(&conn, bid).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&jo_id].len(), 1);
        assert_eq!(list_cleaners(&conn, bid, true).unwrap().len(), 1);
        assert_eq!(list_cleaners(&conn, bid, false).unwrap().len(), 2);
    }

    #[test]
    fn test_chat_details() {
        let (conn, bid) = setup();
        let mut chat = Chat::new(bid, "+15550002222");
        let cid = chat.save(&conn).unwrap();
        ChatMessage::new(cid, role::USER, "hi").save(&conn).unwrap();
        ChatMessage::new(cid, role::ASSISTANT, "hello, how can I help?").save(&conn).unwrap();

        let rows = list_chats_with_details(&conn, bid, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_count, 2);
        assert_eq!(rows[0].last_role.as_deref(), Some("assistant"));
    }

    #[test]
    fn test_business_summary() {
        let (conn, bid) = setup();
        let b = booking(&conn, bid, 3, 9);
        Invoice::new(b.id.unwrap(), 100.0).save(&conn).unwrap();
        let summary = business_summary(&conn, bid).unwrap();
        assert_eq!(summary.bookings, 1);
        assert_eq!(summary.unpaid_invoices, 1);
        assert_eq!(summary.outstanding, 100.0);
        assert_eq!(summary.collected, 0.0);
    }
}
