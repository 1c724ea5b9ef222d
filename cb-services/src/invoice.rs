//! Invoices, payment records and tips.
//!
//! An invoice is paid exactly when its completed payments cover its amount.
//! Every operation that changes either side recomputes the flag inside the
//! same transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use cb_core::constants::payment_status;
use cb_core::error::{CbError, CbResult};
use cb_core::money::round_currency;
use cb_models::{Booking, Invoice, Payment};

use crate::context::ServiceContext;
use crate::event_bus::AppEvent;
use crate::service::{Service, ServiceState};

/// `pct` percent of `amount`, to the cent.
pub fn calculate_percentage_tip(amount: f64, pct: f64) -> f64 {
    round_currency(amount * pct / 100.0)
}

/// Tips must be non-negative and no larger than the invoice.
pub fn validate_tip(tip: f64, invoice_amount: f64) -> CbResult<()> {
    if tip < 0.0 {
        return Err(CbError::Validation("Tip amount cannot be negative".into()));
    }
    if round_currency(tip) > round_currency(invoice_amount) {
        return Err(CbError::Validation(
            "Tip amount cannot exceed the invoice amount".into(),
        ));
    }
    Ok(())
}

/// One suggested tip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipSuggestion {
    pub label: String,
    pub amount: f64,
}

/// 10, 15 and 20 percent of the amount, then fixed 5, 10 and 20.
pub fn suggested_tips(amount: f64) -> Vec<TipSuggestion> {
    let percent = [10.0, 15.0, 20.0].into_iter().map(|pct| TipSuggestion {
        label: format!("{pct}%"),
        amount: calculate_percentage_tip(amount, pct),
    });
    let fixed = [5.0, 10.0, 20.0].into_iter().map(|v: f64| TipSuggestion {
        label: format!("${v:.2}"),
        amount: v,
    });
    percent.chain(fixed).collect()
}

/// Customer-facing invoice page.
pub fn invoice_link(base_url: &str, invoice_id: &str) -> String {
    format!("{}/invoice/invoices/{}/preview/", base_url.trim_end_matches('/'), invoice_id)
}

fn normalize_status(status: &str) -> CbResult<String> {
    let upper = status.trim().to_uppercase();
    if payment_status::ALL.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(CbError::Validation(format!(
            "Unknown payment status '{}', expected one of {}",
            status,
            payment_status::ALL.join(", ")
        )))
    }
}

/// A payment write and the paid state it left behind.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub invoice: Invoice,
    pub became_paid: bool,
}

/// Invoice lookups, payment recording and tips.
pub struct InvoiceService {
    state: ServiceState,
    ctx: ServiceContext,
}

impl InvoiceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            ctx,
        }
    }

    pub fn get(&self, invoice_id: &str) -> CbResult<Invoice> {
        let conn = self.ctx.database.conn()?;
        Invoice::find_by_invoice_id(&conn, invoice_id)?
            .ok_or_else(|| CbError::not_found("invoice", invoice_id))
    }

    /// Invoice of a booking, by public booking id.
    pub fn for_booking(&self, booking_id: &str) -> CbResult<(Booking, Invoice)> {
        let conn = self.ctx.database.conn()?;
        let booking = Booking::find_by_booking_id(&conn, booking_id)?
            .ok_or_else(|| CbError::not_found("booking", booking_id))?;
        let row = booking.id.unwrap_or_default();
        let invoice = Invoice::find_by_booking(&conn, row)?
            .ok_or_else(|| CbError::not_found("invoice for booking", booking_id))?;
        Ok((booking, invoice))
    }

    pub fn payments(&self, invoice: &Invoice) -> CbResult<Vec<Payment>> {
        let conn = self.ctx.database.conn()?;
        invoice.payments(&conn)
    }

    pub fn balance(&self, invoice: &Invoice) -> CbResult<f64> {
        let conn = self.ctx.database.conn()?;
        invoice.balance(&conn)
    }

    pub fn link(&self, invoice: &Invoice) -> String {
        invoice_link(&self.ctx.config.app.base_url, &invoice.invoice_id)
    }

    pub fn record_payment(
        &self,
        invoice_id: &str,
        amount: f64,
        method: Option<&str>,
        status: &str,
        external_id: Option<&str>,
    ) -> CbResult<PaymentOutcome> {
        self.record_payment_at(invoice_id, amount, method, status, external_id, Utc::now())
    }

    /// Store a payment attempt and recompute the invoice's paid flag.
    pub fn record_payment_at(
        &self,
        invoice_id: &str,
        amount: f64,
        method: Option<&str>,
        status: &str,
        external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> CbResult<PaymentOutcome> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(CbError::Validation("Payment amount must be positive".into()));
        }
        let status = normalize_status(status)?;

        let outcome = self.ctx.database.transaction(|conn| {
            let invoice = Invoice::find_by_invoice_id(conn, invoice_id)?
                .ok_or_else(|| CbError::not_found("invoice", invoice_id))?;
            let invoice_row = invoice.id.unwrap_or_default();

            let mut payment = Payment::new(invoice_row, round_currency(amount), &status);
            payment.method = method.map(str::to_string);
            payment.external_id = external_id.map(str::to_string);
            payment.created_at = now;
            if payment.is_completed() {
                payment.paid_at = Some(now);
            }
            payment.save(conn)?;

            let (was_paid, is_paid) = Invoice::refresh_paid(conn, invoice_row)?;
            let invoice = Invoice { is_paid, ..invoice };
            Ok(PaymentOutcome {
                payment,
                invoice,
                became_paid: is_paid && !was_paid,
            })
        })?;

        info!(
            "payment {} of {} on {} ({}), paid={}",
            outcome.payment.payment_id,
            outcome.payment.amount,
            outcome.invoice.invoice_id,
            outcome.payment.status,
            outcome.invoice.is_paid
        );
        self.emit_payment(&outcome);
        Ok(outcome)
    }

    pub fn update_payment_status(&self, payment_id: &str, status: &str) -> CbResult<PaymentOutcome> {
        self.update_payment_status_at(payment_id, status, Utc::now())
    }

    /// Change a payment's status and recompute the invoice's paid flag.
    pub fn update_payment_status_at(
        &self,
        payment_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> CbResult<PaymentOutcome> {
        let status = normalize_status(status)?;

        let outcome = self.ctx.database.transaction(|conn| {
            let mut payment = Payment::find_by_payment_id(conn, payment_id)?
                .ok_or_else(|| CbError::not_found("payment", payment_id))?;
            payment.status = status.clone();
            if payment.is_completed() && payment.paid_at.is_none() {
                payment.paid_at = Some(now);
            }
            payment.save(conn)?;

            let (was_paid, is_paid) = Invoice::refresh_paid(conn, payment.invoice_id)?;
            let invoice = Invoice::find_by_id(conn, payment.invoice_id)?
                .ok_or_else(|| CbError::not_found("invoice", payment.invoice_id.to_string()))?;
            Ok(PaymentOutcome {
                payment,
                invoice,
                became_paid: is_paid && !was_paid,
            })
        })?;

        info!("payment {} is now {}", outcome.payment.payment_id, outcome.payment.status);
        self.emit_payment(&outcome);
        Ok(outcome)
    }

    fn emit_payment(&self, outcome: &PaymentOutcome) {
        self.ctx.event_bus.emit(AppEvent::PaymentRecorded {
            invoice_id: outcome.invoice.invoice_id.clone(),
            payment_id: outcome.payment.payment_id.clone(),
            status: outcome.payment.status.clone(),
        });
        if outcome.became_paid {
            self.ctx.event_bus.emit(AppEvent::InvoicePaid {
                invoice_id: outcome.invoice.invoice_id.clone(),
            });
        }
    }

    /// Set the tip of a booking and fold it into the invoice amount.
    ///
    /// Replaces any earlier tip. The tip is checked against the invoice
    /// amount without tip.
    pub fn add_tip(&self, booking_id: &str, tip: f64) -> CbResult<(Booking, Invoice)> {
        let tip = round_currency(tip);
        let (booking, invoice) = self.ctx.database.transaction(|conn| {
            let mut booking = Booking::find_by_booking_id(conn, booking_id)?
                .ok_or_else(|| CbError::not_found("booking", booking_id))?;
            let booking_row = booking.id.unwrap_or_default();
            let mut invoice = Invoice::find_by_booking(conn, booking_row)?
                .ok_or_else(|| CbError::not_found("invoice for booking", booking_id))?;

            let base = round_currency(invoice.amount - booking.tip);
            validate_tip(tip, base)?;

            booking.tip = tip;
            booking.save(conn)?;
            invoice.amount = round_currency(base + tip);
            invoice.save(conn)?;

            let (_, is_paid) = Invoice::refresh_paid(conn, invoice.id.unwrap_or_default())?;
            invoice.is_paid = is_paid;
            Ok((booking, invoice))
        })?;

        info!("tip {} on {}, invoice {} now {}", tip, booking.booking_id, invoice.invoice_id, invoice.amount);
        Ok((booking, invoice))
    }
}

impl Service for InvoiceService {
    fn name(&self) -> &str {
        "invoices"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_tip() {
        assert_eq!(calculate_percentage_tip(200.0, 15.0), 30.0);
        assert_eq!(calculate_percentage_tip(123.45, 10.0), 12.35);
        assert_eq!(calculate_percentage_tip(99.99, 20.0), 20.0);
    }

    #[test]
    fn test_validate_tip_messages() {
        assert!(validate_tip(0.0, 100.0).is_ok());
        assert!(validate_tip(100.0, 100.0).is_ok());
        assert_eq!(
            validate_tip(-1.0, 100.0).unwrap_err().to_string(),
            "Tip amount cannot be negative"
        );
        assert_eq!(
            validate_tip(100.01, 100.0).unwrap_err().to_string(),
            "Tip amount cannot exceed the invoice amount"
        );
    }

    #[test]
    fn test_suggested_tips() {
        let tips = suggested_tips(180.0);
        let amounts: Vec<f64> = tips.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![18.0, 27.0, 36.0, 5.0, 10.0, 20.0]);
        assert_eq!(tips[1].label, "15%");
        assert_eq!(tips[3].label, "$5.00");
    }

    #[test]
    fn test_invoice_link() {
        assert_eq!(
            invoice_link("https://app.example.com/", "INVab12C"),
            "https://app.example.com/invoice/invoices/INVab12C/preview/"
        );
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(" completed ").unwrap(), "COMPLETED");
        assert!(matches!(normalize_status("paid"), Err(CbError::Validation(_))));
    }
}
