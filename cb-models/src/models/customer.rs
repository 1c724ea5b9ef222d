//! Customer entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::constants::id_prefix;
use cb_core::error::{CbError, CbResult};
use cb_core::ids::generate_id;

use super::business::CustomerPricing;

/// A person who has booked, or is booking, with a business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<i64>,
    pub customer_id: String,
    pub business_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(business_id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id: None,
            customer_id: String::new(),
            business_id,
            first_name: first_name.into(),
            last_name: None,
            email: None,
            phone: None,
            address1: None,
            city: None,
            state: None,
            zip_code: None,
            created_at: Utc::now(),
        }
    }

    /// Construct a Customer from a database row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            customer_id: row.get("customer_id")?,
            business_id: row.get("business_id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            address1: row.get("address1")?,
            city: row.get("city")?,
            state: row.get("state")?,
            zip_code: row.get("zip_code")?,
            created_at: row.get("created_at")?,
        })
    }

    // ─── Static finders ──────────────────────────────────────────────────

    pub fn find_by_id(conn: &Connection, id: i64) -> CbResult<Option<Self>> {
        match conn.query_row("SELECT * FROM customers WHERE id = ?1", [id], Self::from_row) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    /// Find a customer of a business by phone or, failing that, by email
    /// (case-insensitive).
    pub fn find_by_contact(
        conn: &Connection,
        business_id: i64,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> CbResult<Option<Self>> {
        if let Some(phone) = phone.filter(|p| !p.is_empty()) {
            match conn.query_row(
                "SELECT * FROM customers WHERE business_id = ?1 AND phone = ?2 ORDER BY id LIMIT 1",
                params![business_id, phone],
                Self::from_row,
            ) {
                Ok(c) => return Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(CbError::Database(e.to_string())),
            }
        }
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            match conn.query_row(
                "SELECT * FROM customers WHERE business_id = ?1 AND LOWER(email) = LOWER(?2) ORDER BY id LIMIT 1",
                params![business_id, email],
                Self::from_row,
            ) {
                Ok(c) => return Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(CbError::Database(e.to_string())),
            }
        }
        Ok(None)
    }

    /// Customer price overrides, if any.
    pub fn pricing(&self, conn: &Connection) -> CbResult<Option<CustomerPricing>> {
        match self.id {
            Some(id) => CustomerPricing::find_by_customer(conn, id),
            None => Ok(None),
        }
    }

    // ─── Computed properties ─────────────────────────────────────────────

    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        if self.customer_id.is_empty() {
            self.customer_id = generate_id(id_prefix::CUSTOMER);
        }

        conn.execute(
            "INSERT INTO customers (
                customer_id, business_id, first_name, last_name, email, phone,
                address1, city, state, zip_code, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
            ON CONFLICT(customer_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone = excluded.phone,
                address1 = excluded.address1,
                city = excluded.city,
                state = excluded.state,
                zip_code = excluded.zip_code",
            params![
                self.customer_id,
                self.business_id,
                self.first_name,
                self.last_name,
                self.email,
                self.phone,
                self.address1,
                self.city,
                self.state,
                self.zip_code,
                self.created_at,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM customers WHERE customer_id = ?1",
                [&self.customer_id],
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
    use crate::models::business::{Business, PriceField};
    use crate::schema;

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let mut business = Business::new("Customers Inc");
        let bid = business.save(&conn).unwrap();
        (conn, bid)
    }

    #[test]
    fn test_save_assigns_customer_id() {
        let (conn, bid) = setup();
        let mut customer = Customer::new(bid, "Ana");
        customer.save(&conn).unwrap();
        assert!(customer.customer_id.starts_with("CU"));
        assert_eq!(customer.customer_id.len(), 7);
    }

    #[test]
    fn test_find_by_contact_prefers_phone() {
        let (conn, bid) = setup();
        let mut a = Customer::new(bid, "Ana");
        a.phone = Some("+15550001111".into());
        a.save(&conn).unwrap();
        let mut b = Customer::new(bid, "Ben");
        b.email = Some("ben@example.com".into());
        b.save(&conn).unwrap();

        let by_phone = Customer::find_by_contact(&conn, bid, Some("+15550001111"), Some("ben@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_phone.first_name, "Ana");

        let by_email = Customer::find_by_contact(&conn, bid, Some("+19999999999"), Some("BEN@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.first_name, "Ben");

        assert!(Customer::find_by_contact(&conn, bid, None, None).unwrap().is_none());
    }

    #[test]
    fn test_full_name() {
        let mut c = Customer::new(1, "Ana");
        assert_eq!(c.full_name(), "Ana");
        c.last_name = Some("Lopez".into());
        assert_eq!(c.full_name(), "Ana Lopez");
    }

    #[test]
    fn test_pricing_overrides() {
        let (conn, bid) = setup();
        let mut customer = Customer::new(bid, "Vip");
        let cid = customer.save(&conn).unwrap();
        assert!(customer.pricing(&conn).unwrap().is_none());

        let mut pricing = CustomerPricing {
            id: None,
            customer_id: cid,
            overrides: Default::default(),
        };
        pricing.overrides.set(PriceField::BasePrice, Some(0.0));
        pricing.save(&conn).unwrap();

        let loaded = customer.pricing(&conn).unwrap().unwrap();
        assert_eq!(loaded.overrides.get(PriceField::BasePrice), Some(0.0));
        assert_eq!(loaded.overrides.get(PriceField::TaxPercent), None);
    }
}
