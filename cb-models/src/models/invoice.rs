//! Invoice and payment entity models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::constants::{id_prefix, payment_status};
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

/// The bill for one booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Option<i64>,
    pub invoice_id: String,
    pub booking_id: i64,
    pub amount: f64,
    /// Derived from completed payments; see [`Invoice::refresh_paid`].
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(booking_id: i64, amount: f64) -> Self {
        Self {
            id: None,
            invoice_id: String::new(),
            booking_id,
            amount,
            is_paid: false,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            invoice_id: row.get("invoice_id")?,
            booking_id: row.get("booking_id")?,
            amount: row.get("amount")?,
            is_paid: row.get::<_, i32>("is_paid")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM invoices WHERE id = ?1", [id], Self::from_row) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn find_by_invoice_id(conn: &Connection, invoice_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM invoices WHERE invoice_id = ?1",
            [invoice_id],
            Self::from_row,
        ) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn find_by_booking(conn: &Connection, booking_id: i64) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM invoices WHERE booking_id = ?1",
            [booking_id],
            Self::from_row,
        ) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Payments recorded against this invoice, oldest first.
    pub fn payments(&self, conn: &Connection) -> CbResult<Vec<Payment>> {
        match self.id {
            Some(id) => Payment::list_for_invoice(conn, id),
            None => Ok(Vec::new()),
        }
    }

    /// Sum of `COMPLETED` payments.
    pub fn completed_total(conn: &Connection, id: i64) -> CbResult<f64> {
        conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = ?1 AND status = ?2",
            params![id, payment_status::COMPLETED],
            |row| row.get(0),
        )
        .map_err(|e| CbError::Database(e.to_string()))
    }

    /// Recompute `is_paid` from completed payments and store it.
    ///
    /// Returns `(was_paid, is_paid)`.
    pub fn refresh_paid(conn: &Connection, id: i64) -> CbResult<(bool, bool)> {
        let invoice = Self::find_by_id(conn, id)?
            .ok_or_else(|| CbError::not_found("invoice", id.to_string()))?;
        let paid_total = Self::completed_total(conn, id)?;
        // Compare in cents so 99.999999 of floating error still counts as 100.
        let is_paid = (paid_total * 100.0).round() >= (invoice.amount * 100.0).round();
        if is_paid != invoice.is_paid {
            conn.execute(
                "UPDATE invoices SET is_paid = ?1 WHERE id = ?2",
                params![is_paid as i32, id],
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        }
        Ok((invoice.is_paid, is_paid))
    }

    /// Remaining amount to collect, never negative.
    pub fn balance(&self, conn: &Connection) -> CbResult<f64> {
        let id = self
            .id
            .ok_or_else(|| CbError::Database("invoice has no id".into()))?;
        Ok((self.amount - Self::completed_total(conn, id)?).max(0.0))
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.invoice_id.is_empty() {
            self.invoice_id = generate_id(id_prefix::INVOICE);
        }

        conn.execute(
            "INSERT INTO invoices (invoice_id, booking_id, amount, is_paid, created_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(invoice_id) DO UPDATE SET
                amount = excluded.amount,
                is_paid = excluded.is_paid",
            params![
                self.invoice_id,
                self.booking_id,
                self.amount,
                self.is_paid as i32,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM invoices WHERE invoice_id = ?1",
                [&self.invoice_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

/// A payment attempt against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Option<i64>,
    pub payment_id: String,
    pub invoice_id: i64,
    pub amount: f64,
    pub method: Option<String>,
    pub status: String,
    /// Reference from the payment processor.
    pub external_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(invoice_id: i64, amount: f64, status: &str) -> Self {
        Self {
            id: None,
            payment_id: String::new(),
            invoice_id,
            amount,
            method: None,
            status: status.to_string(),
            external_id: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            payment_id: row.get("payment_id")?,
            invoice_id: row.get("invoice_id")?,
            amount: row.get("amount")?,
            method: row.get("method")?,
            status: row.get("status")?,
            external_id: row.get("external_id")?,
            paid_at: row.get("paid_at")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_payment_id(conn: &Connection, payment_id: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM payments WHERE payment_id = ?1",
            [payment_id],
            Self::from_row,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn list_for_invoice(conn: &Connection, invoice_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM payments WHERE invoice_id = ?1 ORDER BY id")
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([invoice_id], Self::from_row)
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    pub fn is_completed(&self) -> bool {
        self.status == payment_status::COMPLETED
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if !payment_status::ALL.contains(&self.status.as_str()) {
            return Err(CbError::Validation(format!("unknown payment status '{}'", self.status)));
        }
        if self.payment_id.is_empty() {
            self.payment_id = generate_id(id_prefix::PAYMENT);
        }

        conn.execute(
            "INSERT INTO payments (
                payment_id, invoice_id, amount, method, status, external_id, paid_at, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
            ON CONFLICT(payment_id) DO UPDATE SET
                amount = excluded.amount,
                method = excluded.method,
                status = excluded.status,
                external_id = excluded.external_id,
                paid_at = excluded.paid_at",
            params![
                self.payment_id,
                self.invoice_id,
                self.amount,
                self.method,
                self.status,
                self.external_id,
                self.paid_at,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM payments WHERE payment_id = ?1",
                [&self.payment_id],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use crate::models::booking::Booking;
    use crate::models::business::Business;
    use crate::schema;

    fn invoice(conn: &Connection, amount: f64) -> Invoice {
        let bid = Business::new("Billing").save(conn).unwrap();
        let mut booking = Booking::new(
            bid,
            "Ana",
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let booking_id = booking.save(conn).unwrap();
        let mut invoice = Invoice::new(booking_id, amount);
        invoice.save(conn).unwrap();
        invoice
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_paid_once_completed_total_reaches_amount() {
        let conn = setup();
        let inv = invoice(&conn, 100.0);
        let id = inv.id.unwrap();

        Payment::new(id, 60.0, payment_status::COMPLETED).save(&conn).unwrap();
        assert_eq!(Invoice::refresh_paid(&conn, id).unwrap(), (false, false));

        Payment::new(id, 40.0, payment_status::PENDING).save(&conn).unwrap();
        assert_eq!(Invoice::refresh_paid(&conn, id).unwrap(), (false, false));

        Payment::new(id, 40.0, payment_status::COMPLETED).save(&conn).unwrap();
        assert_eq!(Invoice::refresh_paid(&conn, id).unwrap(), (false, true));
        assert!(Invoice::find_by_id(&conn, id).unwrap().unwrap().is_paid);
    }

    #[test]
    fn test_paid_reverts_when_amount_grows() {
        let conn = setup();
        let mut inv = invoice(&conn, 50.0);
        let id = inv.id.unwrap();
        Payment::new(id, 50.0, payment_status::COMPLETED).save(&conn).unwrap();
        Invoice::refresh_paid(&conn, id).unwrap();

        inv.amount = 60.0;
        inv.is_paid = true;
        inv.save(&conn).unwrap();
        assert_eq!(Invoice::refresh_paid(&conn, id).unwrap(), (true, false));
        assert_eq!(inv.balance(&conn).unwrap(), 10.0);
    }

    #[test]
    fn test_rejects_unknown_status() {
        let conn = setup();
        let inv = invoice(&conn, 10.0);
        let mut payment = Payment::new(inv.id.unwrap(), 10.0, "DONE");
        assert!(matches!(payment.save(&conn), Err(CbError::Validation(_))));
    }

    #[test]
    fn test_payment_ids() {
        let conn = setup();
        let inv = invoice(&conn, 10.0);
        assert!(inv.invoice_id.starts_with("INV"));
        let mut payment = Payment::new(inv.id.unwrap(), 10.0, payment_status::COMPLETED);
        payment.save(&conn).unwrap();
        assert!(payment.payment_id.starts_with("PY"));
        assert_eq!(inv.payments(&conn).unwrap().len(), 1);
    }
}
