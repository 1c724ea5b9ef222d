//! Discount codes: validation, discount math and redemption.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use cb_core::error::{CbError, CbResult};
use cb_core::money::{round_currency, round_to_tenth};
use cb_models::models::coupon::{DISCOUNT_PERCENTAGE, LIMIT_OVERALL, LIMIT_PER_USER};
use cb_models::{Business, Coupon};

use crate::context::ServiceContext;
use crate::service::{Service, ServiceState};

/// Discount a coupon gives on `price`, rounded to 0.1.
///
/// Percentage coupons take that share of the price. Fixed coupons never
/// discount more than the price itself.
pub fn discount_for(coupon: &Coupon, price: f64) -> f64 {
    let price = price.max(0.0);
    let discount = if coupon.discount_type == DISCOUNT_PERCENTAGE {
        price * coupon.discount_value / 100.0
    } else {
        coupon.discount_value.min(price)
    };
    round_to_tenth(discount.max(0.0))
}

/// `price` after the coupon, never below zero.
pub fn apply_discount(coupon: &Coupon, price: f64) -> f64 {
    round_currency((price - discount_for(coupon, price)).max(0.0))
}

/// Why a coupon cannot be used, as shown to the customer.
pub fn rejection_reason(
    conn: &Connection,
    coupon: &Coupon,
    customer_email: Option<&str>,
    today: NaiveDate,
) -> CbResult<Option<&'static str>> {
    if !coupon.is_active {
        return Ok(Some("This coupon is no longer active"));
    }
    if coupon.expiry_date.is_some_and(|expiry| expiry < today) {
        return Ok(Some("This coupon has expired"));
    }
    let Some(limit) = coupon.usage_limit else {
        return Ok(None);
    };
    if coupon.limit_type == LIMIT_OVERALL && coupon.times_used >= limit {
        return Ok(Some("This coupon has reached its usage limit"));
    }
    if coupon.limit_type == LIMIT_PER_USER {
        if let Some(email) = customer_email.filter(|e| !e.trim().is_empty()) {
            if coupon.usage_count_for(conn, email)? >= limit {
                return Ok(Some("You have already used this coupon the maximum number of times"));
            }
        }
    }
    Ok(None)
}

/// Result of checking a code against a price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponCheck {
    pub valid: bool,
    pub message: String,
    pub code: Option<String>,
    pub discount_amount: f64,
    pub final_price: f64,
}

impl CouponCheck {
    fn rejected(message: &str, price: f64) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
            code: None,
            discount_amount: 0.0,
            final_price: round_currency(price),
        }
    }
}

/// Look up and check a code. Returns the coupon and its discount on `price`,
/// or a `Validation` error carrying the customer-facing reason.
pub fn resolve(
    conn: &Connection,
    business_id: i64,
    code: &str,
    customer_email: Option<&str>,
    price: f64,
    today: NaiveDate,
) -> CbResult<(Coupon, f64)> {
    if code.trim().is_empty() {
        return Err(CbError::Validation("Please enter a coupon code".into()));
    }
    let coupon = Coupon::find_by_code(conn, business_id, code)?
        .ok_or_else(|| CbError::Validation("Invalid coupon code".into()))?;
    if let Some(reason) = rejection_reason(conn, &coupon, customer_email, today)? {
        return Err(CbError::Validation(reason.into()));
    }
    let discount = discount_for(&coupon, price);
    Ok((coupon, discount))
}

/// Coupon management for businesses.
pub struct CouponService {
    state: ServiceState,
    ctx: ServiceContext,
}

impl CouponService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            ctx,
        }
    }

    pub fn create(&self, coupon: &mut Coupon) -> CbResult<i64> {
        let conn = self.ctx.database.conn()?;
        if Coupon::find_by_code(&conn, coupon.business_id, &coupon.code)?.is_some() {
            return Err(CbError::Validation("A coupon with this code already exists".into()));
        }
        if coupon.discount_value < 0.0 {
            return Err(CbError::Validation("Discount value cannot be negative".into()));
        }
        let id = coupon.save(&conn)?;
        info!("created coupon {} for business {}", coupon.code, coupon.business_id);
        Ok(id)
    }

    pub fn list(&self, business: &Business) -> CbResult<Vec<Coupon>> {
        let conn = self.ctx.database.conn()?;
        Coupon::list_for_business(&conn, business.id.unwrap_or_default())
    }

    /// Check a code without redeeming it.
    pub fn validate(
        &self,
        business: &Business,
        code: &str,
        customer_email: Option<&str>,
        price: f64,
        today: NaiveDate,
    ) -> CbResult<CouponCheck> {
        let conn = self.ctx.database.conn()?;
        let business_id = business.id.unwrap_or_default();
        match resolve(&conn, business_id, code, customer_email, price, today) {
            Ok((coupon, discount)) => {
                debug!("coupon {} valid for {}: -{}", coupon.code, price, discount);
                Ok(CouponCheck {
                    valid: true,
                    message: "Coupon is valid".into(),
                    code: Some(coupon.code.clone()),
                    discount_amount: discount,
                    final_price: apply_discount(&coupon, price),
                })
            }
            Err(CbError::Validation(message)) => Ok(CouponCheck::rejected(&message, price)),
            Err(e) => Err(e),
        }
    }

    /// Count one use of a coupon by `customer_email`.
    pub fn redeem(coupon: &mut Coupon, conn: &Connection, customer_email: &str, at: DateTime<Utc>) -> CbResult<()> {
        coupon.record_usage(conn, customer_email, at)?;
        info!("coupon {} redeemed ({} uses)", coupon.code, coupon.times_used);
        Ok(())
    }
}

impl Service for CouponService {
    fn name(&self) -> &str {
        "coupons"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.state = ServiceState::Running;
        Ok(())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.state = ServiceState::Stopped;
        Ok(())
    }
}
