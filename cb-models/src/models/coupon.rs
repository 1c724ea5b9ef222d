//! Coupon entity model and per-customer usage records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use cb_core::error::{CbError, CbResult};

/// `percentage` or `fixed`.
pub const DISCOUNT_PERCENTAGE: &str = "percentage";
pub const DISCOUNT_FIXED: &str = "fixed";

/// `overall` counts every redemption, `per_user` counts per email.
pub const LIMIT_OVERALL: &str = "overall";
pub const LIMIT_PER_USER: &str = "per_user";

/// A discount code of one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Option<i64>,
    pub business_id: i64,
    /// Stored trimmed and uppercased.
    pub code: String,
    pub discount_type: String,
    pub discount_value: f64,
    pub limit_type: String,
    /// `None` means unlimited.
    pub usage_limit: Option<i64>,
    pub times_used: i64,
    /// Last valid day, inclusive.
    pub expiry_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Coupon {
    pub fn new(business_id: i64, code: &str, discount_type: &str, discount_value: f64) -> Self {
        Self {
            id: None,
            business_id,
            code: normalize_code(code),
            discount_type: discount_type.to_string(),
            discount_value,
            limit_type: LIMIT_OVERALL.to_string(),
            usage_limit: None,
            times_used: 0,
            expiry_date: None,
            is_active: true,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            code: row.get("code")?,
            discount_type: row.get("discount_type")?,
            discount_value: row.get("discount_value")?,
            limit_type: row.get("limit_type")?,
            usage_limit: row.get("usage_limit")?,
            times_used: row.get("times_used")?,
            expiry_date: row.get("expiry_date")?,
            is_active: row.get::<_, i32>("is_active")? != 0,
        })
    }

    /// Find a coupon by code, ignoring case and surrounding whitespace.
    pub fn find_by_code(conn: &Connection, business_id: i64, code: &str) -> CbResult<Option<Self>> {
        match conn.query_row(
            "SELECT * FROM coupons WHERE business_id = ?1 AND code = ?2",
            params![business_id, normalize_code(code)],
            Self::from_row,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CbError::Database(e.to_string())),
        }
    }

    pub fn list_for_business(conn: &Connection, business_id: i64) -> CbResult<Vec<Self>> {
        let mut stmt = conn
            .prepare("SELECT * FROM coupons WHERE business_id = ?1 ORDER BY code")
            .map_err(|e| CbError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([business_id], Self::from_row)
            .map_err(|e| CbError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CbError::Database(e.to_string()))
    }

    /// Number of redemptions by one customer email.
    pub fn usage_count_for(&self, conn: &Connection, email: &str) -> CbResult<i64> {
        let id = self
            .id
            .ok_or_else(|| CbError::Database("coupon has no id".into()))?;
        conn.query_row(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = ?1 AND LOWER(customer_email) = LOWER(?2)",
            params![id, email.trim()],
            |row| row.get(0),
        )
        .map_err(|e| CbError::Database(e.to_string()))
    }

    /// Count one redemption and record who used it.
    pub fn record_usage(&mut self, conn: &Connection, email: &str, at: DateTime<Utc>) -> CbResult<()> {
        let id = self
            .id
            .ok_or_else(|| CbError::Database("coupon has no id".into()))?;
        conn.execute(
            "UPDATE coupons SET times_used = times_used + 1 WHERE id = ?1",
            [id],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO coupon_usages (coupon_id, customer_email, used_at) VALUES (?1,?2,?3)",
            params![id, email.trim().to_lowercase(), at],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;
        self.times_used += 1;
        Ok(())
    }

    pub fn save(&mut self, conn: &Connection) -> CbResult<i64> {
        self.code = normalize_code(&self.code);
        if self.code.is_empty() {
            return Err(CbError::Validation("coupon code cannot be empty".into()));
        }
        if ![DISCOUNT_PERCENTAGE, DISCOUNT_FIXED].contains(&self.discount_type.as_str()) {
            return Err(CbError::Validation(format!(
                "unknown discount type '{}'",
                self.discount_type
            )));
        }
        if ![LIMIT_OVERALL, LIMIT_PER_USER].contains(&self.limit_type.as_str()) {
            return Err(CbError::Validation(format!("unknown limit type '{}'", self.limit_type)));
        }

        conn.execute(
            "INSERT INTO coupons (
                business_id, code, discount_type, discount_value, limit_type,
                usage_limit, times_used, expiry_date, is_active
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
            ON CONFLICT(business_id, code) DO UPDATE SET
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                limit_type = excluded.limit_type,
                usage_limit = excluded.usage_limit,
                expiry_date = excluded.expiry_date,
                is_active = excluded.is_active",
            params![
                self.business_id,
                self.code,
                self.discount_type,
                self.discount_value,
                self.limit_type,
                self.usage_limit,
                self.times_used,
                self.expiry_date,
                self.is_active as i32,
            ],
        )
        .map_err(|e| CbError::Database(e.to_string()))?;

        let real_id: i64 = conn
            .query_row(
                "SELECT id FROM coupons WHERE business_id = ?1 AND code = ?2",
                params![self.business_id, self.code],
                |row| row.get(0),
            )
            .map_err(|e| CbError::Database(e.to_string()))?;
        self.id = Some(real_id);
        Ok(real_id)
    }
}

/// Trim and uppercase a coupon code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
