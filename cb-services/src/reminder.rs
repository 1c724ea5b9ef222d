//! Periodic reminder and release sweeps.
//!
//! Each sweep is a time-window query plus a notification per match. The
//! notification tracker keeps repeated sweeps from re-sending, so a sweep
//! can run as often as the caller likes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::{info, warn};

use cb_core::constants::notification_kind;
use cb_core::error::{CbError, CbResult};
use cb_models::queries;
use cb_models::{Booking, Business, Cleaner, Invoice};

use crate::context::ServiceContext;
use crate::datetime;
use crate::invoice::invoice_link;
use crate::notification::{self, Delivery, NotificationService};
use crate::service::{Service, ServiceState};

/// What one sweep did. Ids are public booking ids, or lead ids for
/// `lead_calls`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub payment_reminders: Vec<String>,
    pub released: Vec<String>,
    pub appointment_reminders: Vec<String>,
    pub cleaner_reminders: Vec<String>,
    pub final_reminders: Vec<String>,
    pub follow_ups: Vec<String>,
    pub lead_calls: Vec<String>,
    pub failures: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.payment_reminders.is_empty()
            && self.released.is_empty()
            && self.appointment_reminders.is_empty()
            && self.cleaner_reminders.is_empty()
            && self.final_reminders.is_empty()
            && self.follow_ups.is_empty()
            && self.lead_calls.is_empty()
            && self.failures == 0
    }
}

/// Start of a booking as an instant, or `None` when the local time does not exist.
fn starts_utc(business: &Business, booking: &Booking) -> Option<DateTime<Utc>> {
    let tz = datetime::parse_timezone(&business.timezone);
    tz.from_local_datetime(&booking.starts_at())
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Runs the reminder and release sweeps.
pub struct ReminderService {
    state: ServiceState,
    ctx: ServiceContext,
    notifications: NotificationService,
}

impl ReminderService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            notifications: NotificationService::new(ctx.clone()),
            ctx,
        }
    }

    fn business_cached<'c>(&self, cache: &'c mut HashMap<i64, Business>, id: i64) -> CbResult<&'c Business> {
        if !cache.contains_key(&id) {
            let business = self.ctx.business_by_row(id)?;
            cache.insert(id, business);
        }
        cache
            .get(&id)
            .ok_or_else(|| CbError::not_found("business", id.to_string()))
    }

    /// Paid, live bookings whose start falls in `[from, until)`, with their
    /// business.
    fn paid_starting(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> CbResult<Vec<(Booking, Business)>> {
        // Local dates differ from UTC by at most a day either way.
        let candidates: Vec<Booking> = {
            let conn = self.ctx.database.conn()?;
            let first = (from - Duration::days(1)).date_naive();
            let last = (until + Duration::days(1)).date_naive();
            let mut out = Vec::new();
            for booking in queries::list_upcoming_bookings(&conn, first, last)? {
                let paid = match booking.id {
                    Some(id) => Invoice::find_by_booking(&conn, id)?.is_some_and(|i| i.is_paid),
                    None => false,
                };
                if paid {
                    out.push(booking);
                }
            }
            out
        };

        let mut businesses = HashMap::new();
        let mut due = Vec::new();
        for booking in candidates {
            let business = self.business_cached(&mut businesses, booking.business_id)?.clone();
            let Some(starts) = starts_utc(&business, &booking) else {
                continue;
            };
            if from <= starts && starts < until {
                due.push((booking, business));
            }
        }
        Ok(due)
    }

    /// Remind customers whose booking is still unpaid some time after it was made.
    pub async fn send_payment_reminders(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let cutoff = now - Duration::minutes(self.ctx.config.reminders.payment_reminder_after_minutes);
        let due: Vec<(Booking, Invoice)> = {
            let conn = self.ctx.database.conn()?;
            queries::list_unpaid_bookings(&conn)?
                .into_iter()
                .filter(|(b, _)| b.payment_reminder_sent_at.is_none() && b.created_at <= cutoff)
                .collect()
        };

        let mut businesses = HashMap::new();
        let mut reminded = Vec::new();
        let mut failures = 0;

        for (mut booking, invoice) in due {
            let Some(phone) = booking.phone_number.clone() else {
                warn!("booking {} has no phone number for a payment reminder", booking.booking_id);
                continue;
            };
            let business = self.business_cached(&mut businesses, booking.business_id)?.clone();
            let link = invoice_link(&self.ctx.config.app.base_url, &invoice.invoice_id);
            let body = notification::payment_reminder_message(&business.name, &link);

            match self
                .notifications
                .notify_customer_at(&business, notification_kind::PAYMENT_REMINDER, &booking.booking_id, &phone, &body, now)
                .await
            {
                Ok(_) => {
                    booking.payment_reminder_sent_at = Some(now);
                    let conn = self.ctx.database.conn()?;
                    booking.save(&conn)?;
                    reminded.push(booking.booking_id);
                }
                Err(e) => {
                    warn!("payment reminder for {} failed: {e}", booking.booking_id);
                    failures += 1;
                }
            }
        }

        Ok((reminded, failures))
    }

    /// Delete bookings that stayed unpaid after their reminder. Their invoices
    /// and payments go with them.
    ///
    /// A booking goes once it is old enough and its reminder has been out for
    /// the gap between the reminder and release windows, so the grace period
    /// the reminder announces always holds.
    pub async fn release_unpaid_bookings(&self, now: DateTime<Utc>) -> CbResult<Vec<String>> {
        let windows = &self.ctx.config.reminders;
        let cutoff = now - Duration::minutes(windows.release_unpaid_after_minutes);
        let grace = Duration::minutes(
            (windows.release_unpaid_after_minutes - windows.payment_reminder_after_minutes).max(0),
        );
        let reminded_by = now - grace;
        let stale: Vec<Booking> = {
            let conn = self.ctx.database.conn()?;
            queries::list_unpaid_bookings(&conn)?
                .into_iter()
                .map(|(b, _)| b)
                .filter(|b| {
                    b.created_at <= cutoff
                        && b.payment_reminder_sent_at.is_some_and(|sent| sent <= reminded_by)
                })
                .collect()
        };

        let mut businesses = HashMap::new();
        let mut released = Vec::new();
        for booking in stale {
            let deleted = {
                let conn = self.ctx.database.conn()?;
                Booking::delete(&conn, booking.id.unwrap_or_default())?
            };
            if !deleted {
                continue;
            }
            info!("released unpaid booking {} ({} {})", booking.booking_id, booking.cleaning_date, booking.start_time);

            if let Some(phone) = booking.phone_number.as_deref() {
                let business = self.business_cached(&mut businesses, booking.business_id)?.clone();
                let body = notification::release_message(&business.name, &booking.first_name);
                if let Err(e) = self
                    .notifications
                    .notify_customer_at(&business, notification_kind::RELEASED, &booking.booking_id, phone, &body, now)
                    .await
                {
                    warn!("release notice for {} failed: {e}", booking.booking_id);
                }
            }
            released.push(booking.booking_id);
        }
        Ok(released)
    }

    /// Remind customers of paid bookings starting within the reminder window.
    pub async fn send_appointment_reminders(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let horizon = now + Duration::hours(self.ctx.config.reminders.appointment_reminder_hours);
        let mut reminded = Vec::new();
        let mut failures = 0;

        for (booking, business) in self.paid_starting(now + Duration::seconds(1), horizon + Duration::seconds(1))? {
            let Some(phone) = booking.phone_number.as_deref() else {
                continue;
            };
            let contact = business.phone.clone().unwrap_or_else(|| business.name.clone());
            let body = notification::appointment_reminder_message(
                &business.name,
                booking.cleaning_date,
                booking.start_time,
                &contact,
            );
            let key = format!("{}:{}", booking.booking_id, booking.starts_at());
            match self
                .notifications
                .notify_customer_at(&business, notification_kind::APPOINTMENT_REMINDER, &key, phone, &body, now)
                .await
            {
                Ok(Delivery::AlreadySent) => {}
                Ok(_) => reminded.push(booking.booking_id.clone()),
                Err(e) => {
                    warn!("appointment reminder for {} failed: {e}", booking.booking_id);
                    failures += 1;
                }
            }
        }

        Ok((reminded, failures))
    }

    /// Tell assigned cleaners about their paid jobs within the reminder window.
    pub async fn send_cleaner_reminders(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let horizon = now + Duration::hours(self.ctx.config.reminders.appointment_reminder_hours);
        let mut reminded = Vec::new();
        let mut failures = 0;

        for (booking, business) in self.paid_starting(now + Duration::seconds(1), horizon + Duration::seconds(1))? {
            let cleaner = {
                let conn = self.ctx.database.conn()?;
                match booking.cleaner_id {
                    Some(id) => Cleaner::find_by_id(&conn, id)?,
                    None => None,
                }
            };
            let Some(phone) = cleaner.as_ref().and_then(|c| c.phone.clone()) else {
                continue;
            };
            let address = [booking.address1.as_deref(), booking.city.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ");
            let body = notification::cleaner_reminder_message(
                &business.name,
                &booking.customer_name(),
                &address,
                booking.cleaning_date,
                booking.start_time,
            );
            let key = format!("{}:{}", booking.booking_id, booking.starts_at());
            match self
                .notifications
                .notify_customer_at(&business, notification_kind::CLEANER_REMINDER, &key, &phone, &body, now)
                .await
            {
                Ok(Delivery::AlreadySent) => {}
                Ok(_) => reminded.push(booking.booking_id.clone()),
                Err(e) => {
                    warn!("cleaner reminder for {} failed: {e}", booking.booking_id);
                    failures += 1;
                }
            }
        }

        Ok((reminded, failures))
    }

    /// Last reminder for paid bookings starting one to two hours from now
    /// (with the default window).
    pub async fn send_final_reminders(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let opens = now + Duration::minutes(self.ctx.config.reminders.final_reminder_minutes);
        let mut reminded = Vec::new();
        let mut failures = 0;

        for (booking, business) in self.paid_starting(opens, opens + Duration::hours(1))? {
            let Some(phone) = booking.phone_number.as_deref() else {
                continue;
            };
            let contact = business.phone.clone().unwrap_or_else(|| business.name.clone());
            let body = notification::final_reminder_message(&business.name, booking.start_time, &contact);
            let key = format!("{}:{}", booking.booking_id, booking.starts_at());
            match self
                .notifications
                .notify_customer_at(&business, notification_kind::FINAL_REMINDER, &key, phone, &body, now)
                .await
            {
                Ok(Delivery::AlreadySent) => {}
                Ok(_) => reminded.push(booking.booking_id.clone()),
                Err(e) => {
                    warn!("final reminder for {} failed: {e}", booking.booking_id);
                    failures += 1;
                }
            }
        }

        Ok((reminded, failures))
    }

    /// Ask for feedback on bookings completed on the business's previous day.
    pub async fn send_follow_ups(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let candidates = {
            let conn = self.ctx.database.conn()?;
            queries::list_completed_bookings(&conn, (now - Duration::days(2)).date_naive(), now.date_naive())?
        };

        let mut businesses = HashMap::new();
        let mut sent = Vec::new();
        let mut failures = 0;

        for booking in candidates {
            let business = self.business_cached(&mut businesses, booking.business_id)?.clone();
            let tz = datetime::parse_timezone(&business.timezone);
            let yesterday = now.with_timezone(&tz).date_naive().pred_opt();
            if yesterday != Some(booking.cleaning_date) {
                continue;
            }
            let Some(phone) = booking.phone_number.as_deref() else {
                continue;
            };
            let body = notification::follow_up_message(
                &business.name,
                &self.ctx.config.app.base_url,
                &booking.booking_id,
                &business.business_id,
            );
            match self
                .notifications
                .notify_customer_at(&business, notification_kind::FOLLOW_UP, &booking.booking_id, phone, &body, now)
                .await
            {
                Ok(Delivery::AlreadySent) => {}
                Ok(_) => sent.push(booking.booking_id.clone()),
                Err(e) => {
                    warn!("follow-up for {} failed: {e}", booking.booking_id);
                    failures += 1;
                }
            }
        }

        Ok((sent, failures))
    }

    /// Call leads that have not converted `time_to_wait` minutes after their
    /// outreach text, for businesses that allow calls.
    pub async fn call_waiting_leads(&self, now: DateTime<Utc>) -> CbResult<(Vec<String>, usize)> {
        let leads = {
            let conn = self.ctx.database.conn()?;
            queries::list_contacted_leads(&conn)?
        };

        let mut businesses = HashMap::new();
        let mut called = Vec::new();
        let mut failures = 0;

        for lead in leads {
            let business = self.business_cached(&mut businesses, lead.business_id)?.clone();
            if !business.use_call || business.time_to_wait <= 0 {
                continue;
            }
            let waited_since = now - Duration::minutes(business.time_to_wait);
            if lead.email_sent_at.map_or(true, |texted| texted > waited_since) {
                continue;
            }
            let Some(phone) = lead.phone_number.as_deref() else {
                continue;
            };
            let message = notification::lead_outreach_message(&business.name, &lead.name);
            match self
                .notifications
                .call_customer_at(&business, notification_kind::LEAD_CALL, &lead.lead_id, phone, &message, now)
                .await
            {
                Ok(Delivery::AlreadySent) => {}
                Ok(_) => called.push(lead.lead_id.clone()),
                Err(e) => {
                    warn!("follow-up call to lead {} failed: {e}", lead.lead_id);
                    failures += 1;
                }
            }
        }

        Ok((called, failures))
    }

    /// One pass of every sweep.
    pub async fn run_all(&self, now: DateTime<Utc>) -> CbResult<SweepReport> {
        let (payment_reminders, payment_failures) = self.send_payment_reminders(now).await?;
        let released = self.release_unpaid_bookings(now).await?;
        let (appointment_reminders, reminder_failures) = self.send_appointment_reminders(now).await?;
        let (cleaner_reminders, cleaner_failures) = self.send_cleaner_reminders(now).await?;
        let (final_reminders, final_failures) = self.send_final_reminders(now).await?;
        let (follow_ups, follow_up_failures) = self.send_follow_ups(now).await?;
        let (lead_calls, call_failures) = self.call_waiting_leads(now).await?;

        let report = SweepReport {
            payment_reminders,
            released,
            appointment_reminders,
            cleaner_reminders,
            final_reminders,
            follow_ups,
            lead_calls,
            failures: payment_failures
                + reminder_failures
                + cleaner_failures
                + final_failures
                + follow_up_failures
                + call_failures,
        };
        if !report.is_empty() {
            info!(
                "sweep: {} payment reminders, {} released, {} appointment reminders, {} cleaner reminders, \
                 {} final reminders, {} follow-ups, {} lead calls, {} failures",
                report.payment_reminders.len(),
                report.released.len(),
                report.appointment_reminders.len(),
                report.cleaner_reminders.len(),
                report.final_reminders.len(),
                report.follow_ups.len(),
                report.lead_calls.len(),
                report.failures
            );
        }
        Ok(report)
    }
}

impl Service for ReminderService {
    fn name(&self) -> &str {
        "reminders"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.notifications.init()?;
        self.state = self.notifications.state();
        Ok(())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.notifications.shutdown()?;
        self.state = ServiceState::Stopped;
        Ok(())
    }
}
