//! Customer notifications over SMS, with a voice-call fallback.
//!
//! Every notification is claimed in the notification tracker before it is
//! sent, keyed by `(business, kind, target)`, so sweeps and event handlers can
//! run repeatedly without texting anyone twice. A failed send gives the claim
//! back so the next attempt can retry.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use cb_api::Messenger;

use cb_core::error::{CbError, CbResult};
use cb_core::money::format_usd;
use cb_core::phone::format_phone_number;
use cb_models::{ApiCredential, Business, NotificationTracker};

use crate::context::ServiceContext;
use crate::event_bus::AppEvent;
use crate::service::{Service, ServiceState};

// ─── Message texts ──────────────────────────────────────────────────────────

fn display_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

fn display_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

pub fn booking_confirmation_message(business: &str, first_name: &str, amount: f64, link: &str) -> String {
    format!(
        "Hello {first_name}, your appointment with {business} is confirmed! Your total is {}. View and pay your invoice here: {link}",
        format_usd(amount)
    )
}

pub fn payment_reminder_message(business: &str, link: &str) -> String {
    format!(
        "REMINDER from {business}: Your booking payment is pending. Your slot will be released in 1 hour if payment is not received. Complete payment here: {link}"
    )
}

pub fn appointment_reminder_message(business: &str, date: NaiveDate, time: NaiveTime, phone: &str) -> String {
    format!(
        "Reminder from {business}: Your cleaning service is scheduled for {} at {}. Please ensure access to your property. Questions? Call {phone}.",
        display_date(date),
        display_time(time)
    )
}

pub fn final_reminder_message(business: &str, time: NaiveTime, phone: &str) -> String {
    format!(
        "REMINDER: Your {business} cleaning service begins in 1 hour at {}. Please ensure property access. Questions? Call {phone}.",
        display_time(time)
    )
}

pub fn cleaner_reminder_message(
    business: &str,
    customer: &str,
    address: &str,
    date: NaiveDate,
    time: NaiveTime,
) -> String {
    format!(
        "Reminder from {business}: you are cleaning for {customer} at {address} on {} at {}.",
        display_date(date),
        display_time(time)
    )
}

pub fn follow_up_message(business: &str, base_url: &str, booking_id: &str, business_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!(
        "Thank you for choosing {business}! How was your cleaning experience? Share feedback: {base}/feedback/{booking_id}/ or book again: {base}/book/{business_id}/"
    )
}

pub fn reschedule_message(business: &str, first_name: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "Hi {first_name}, your cleaning with {business} has been rescheduled to {} at {}. Reply to this message if that time does not work for you.",
        display_date(date),
        display_time(time)
    )
}

pub fn cancellation_message(business: &str, first_name: &str, date: NaiveDate) -> String {
    format!(
        "Hi {first_name}, your cleaning with {business} on {} has been cancelled. Reply any time to book a new appointment.",
        display_date(date)
    )
}

pub fn release_message(business: &str, first_name: &str) -> String {
    format!(
        "Hi {first_name}, we did not receive payment for your booking with {business}, so the slot has been released. Reply to book again."
    )
}

pub fn lead_outreach_message(business: &str, name: &str) -> String {
    format!(
        "Hey {name}, thanks for reaching out to {business}! Reply to this message to get an instant quote and book your cleaning in minutes."
    )
}

// ─── Delivery ───────────────────────────────────────────────────────────────

/// How a notification reached the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Texted; carries the provider message id.
    Sms(String),
    /// Texting failed and a call was placed; carries the provider call id.
    Call(String),
    /// Already sent earlier.
    AlreadySent,
}

/// Sends deduplicated customer notifications.
pub struct NotificationService {
    state: ServiceState,
    ctx: ServiceContext,
}

impl NotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            ctx,
        }
    }

    fn credentials(&self, business: &Business) -> CbResult<ApiCredential> {
        let conn = self.ctx.database.conn()?;
        business
            .credentials(&conn)?
            .filter(ApiCredential::can_send_sms)
            .ok_or_else(|| {
                CbError::Notification(format!("{} has no SMS credentials", business.business_id))
            })
    }

    /// Text `phone` once per `(kind, key)`. When texting fails and the
    /// business allows calls, the message is read out in a call instead.
    pub async fn notify_customer_at(
        &self,
        business: &Business,
        kind: &str,
        key: &str,
        phone: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> CbResult<Delivery> {
        let Some(route) = self.claim(business, kind, key, phone, now)? else {
            return Ok(Delivery::AlreadySent);
        };
        let Route { messenger, business_id, to, creds } = route;

        let delivery = match messenger.send_sms(&creds, &to, body).await {
            Ok(sid) => Ok(Delivery::Sms(sid)),
            Err(sms_err) if business.use_call && self.ctx.config.sms.call_fallback => {
                warn!("SMS {kind} to {to} failed ({sms_err}), calling instead");
                messenger
                    .place_call(&creds, &to, body)
                    .await
                    .map(Delivery::Call)
                    .map_err(|call_err| {
                        CbError::Notification(format!("SMS failed ({sms_err}); call failed ({call_err})"))
                    })
            }
            Err(sms_err) => Err(CbError::Notification(format!("SMS failed: {sms_err}"))),
        };

        self.settle(business_id, kind, key, &to, delivery)
    }

    /// Call `phone` once per `(kind, key)` and read `message` out.
    pub async fn call_customer_at(
        &self,
        business: &Business,
        kind: &str,
        key: &str,
        phone: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> CbResult<Delivery> {
        let Some(route) = self.claim(business, kind, key, phone, now)? else {
            return Ok(Delivery::AlreadySent);
        };
        let Route { messenger, business_id, to, creds } = route;

        let delivery = messenger
            .place_call(&creds, &to, message)
            .await
            .map(Delivery::Call)
            .map_err(|e| CbError::Notification(format!("call failed: {e}")));
        self.settle(business_id, kind, key, &to, delivery)
    }

    /// Resolve the provider, number and credentials, then claim the tracker
    /// entry. `None` when it was claimed before.
    fn claim(
        &self,
        business: &Business,
        kind: &str,
        key: &str,
        phone: &str,
        now: DateTime<Utc>,
    ) -> CbResult<Option<Route>> {
        let messenger = self
            .ctx
            .messenger
            .clone()
            .ok_or_else(|| CbError::Notification("no messaging provider configured".into()))?;
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;
        let to = format_phone_number(phone)
            .ok_or_else(|| CbError::Validation(format!("Invalid phone number: {phone}")))?;
        let creds = self.credentials(business)?;

        let claimed = {
            let conn = self.ctx.database.conn()?;
            NotificationTracker::claim(&conn, business_id, kind, key, now)?
        };
        if !claimed {
            debug!("{kind} for {key} already sent");
            return Ok(None);
        }
        Ok(Some(Route { messenger, business_id, to, creds }))
    }

    /// Announce a delivery, or give the claim back after a failure.
    fn settle(
        &self,
        business_id: i64,
        kind: &str,
        key: &str,
        to: &str,
        delivery: CbResult<Delivery>,
    ) -> CbResult<Delivery> {
        match delivery {
            Ok(delivery) => {
                info!("{kind} for {key} delivered to {to} ({delivery:?})");
                self.ctx.event_bus.emit(AppEvent::ReminderSent {
                    business_id,
                    kind: kind.to_string(),
                    target: key.to_string(),
                });
                Ok(delivery)
            }
            Err(e) => {
                warn!("{kind} for {key} not delivered: {e}");
                let conn = self.ctx.database.conn()?;
                NotificationTracker::release(&conn, business_id, kind, key)?;
                Err(e)
            }
        }
    }
}

struct Route {
    messenger: Arc<dyn Messenger>,
    business_id: i64,
    to: String,
    creds: ApiCredential,
}

impl Service for NotificationService {
    fn name(&self) -> &str {
        "notifications"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        // Without a provider the rest of the app still works; sends fail loudly.
        self.state = if self.ctx.messenger.is_some() {
            ServiceState::Running
        } else {
            warn!("no messaging provider configured; notifications disabled");
            ServiceState::Degraded
        };
        Ok(())
    }

    fn detail(&self) -> Option<String> {
        (self.state == ServiceState::Degraded).then(|| "no messaging provider".to_string())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.state = ServiceState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
    }

    #[test]
    fn test_confirmation_text() {
        let text = booking_confirmation_message("Sparkle", "Ann", 265.2, "https://x/invoice/invoices/INV1/preview/");
        assert_eq!(
            text,
            "Hello Ann, your appointment with Sparkle is confirmed! Your total is $265.20. View and pay your invoice here: https://x/invoice/invoices/INV1/preview/"
        );
    }

    #[test]
    fn test_reminder_texts() {
        let t = appointment_reminder_message("Sparkle", date(), NaiveTime::from_hms_opt(14, 0, 0).unwrap(), "+15125550100");
        assert_eq!(
            t,
            "Reminder from Sparkle: Your cleaning service is scheduled for Monday, March 17, 2025 at 2:00 PM. Please ensure access to your property. Questions? Call +15125550100."
        );
        assert!(payment_reminder_message("Sparkle", "L").starts_with("REMINDER from Sparkle:"));
    }

    #[test]
    fn test_change_texts_mention_date() {
        let r = reschedule_message("Sparkle", "Ann", date(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert!(r.contains("Monday, March 17, 2025 at 9:30 AM"));
        let c = cancellation_message("Sparkle", "Ann", date());
        assert!(c.contains("on Monday, March 17, 2025 has been cancelled"));
        assert!(lead_outreach_message("Sparkle", "Bo").starts_with("Hey Bo,"));
    }

    #[test]
    fn test_final_and_follow_up_texts() {
        let f = final_reminder_message("Sparkle", NaiveTime::from_hms_opt(14, 0, 0).unwrap(), "+15125550100");
        assert!(f.starts_with("REMINDER: Your Sparkle cleaning service begins in 1 hour at 2:00 PM."));
        let u = follow_up_message("Sparkle", "https://book.example.com/", "BKabc12", "BUS-0001");
        assert!(u.contains("https://book.example.com/feedback/BKabc12/"));
        assert!(u.ends_with("book again: https://book.example.com/book/BUS-0001/"));
        let c = cleaner_reminder_message("Sparkle", "Ann Lee", "1 Main St", date(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(c.contains("cleaning for Ann Lee at 1 Main St on Monday, March 17, 2025 at 9:00 AM"));
    }
}
