//! Side effects that follow stored records.
//!
//! The listener consumes the event bus and routes each event to the
//! messages and webhooks that go with it. Services that record bookings,
//! leads and payments never call these directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use cb_core::constants::notification_kind;
use cb_core::error::{CbError, CbResult};
use cb_models::{Booking, Invoice, Lead};

use crate::context::ServiceContext;
use crate::event_bus::{event_label, AppEvent, EventBus};
use crate::invoice::invoice_link;
use crate::notification::{self, Delivery, NotificationService};
use crate::service::{Service, ServiceState};

/// JSON body posted to the booking webhook.
pub fn booking_webhook_payload(booking: &Booking) -> Value {
    let mut payload = json!({
        "bookingId": booking.booking_id,
        "firstName": booking.first_name,
        "lastName": booking.last_name,
        "email": booking.email,
        "phoneNumber": booking.phone_number,
        "address1": booking.address1,
        "address2": booking.address2,
        "city": booking.city,
        "stateOrProvince": booking.state_or_province,
        "zipCode": booking.zip_code,
        "bedrooms": booking.bedrooms,
        "bathrooms": booking.bathrooms,
        "squareFeet": booking.square_feet,
        "serviceType": booking.service_type,
        "cleaningDate": booking.cleaning_date.format("%Y-%m-%d").to_string(),
        "startTime": booking.start_time.format("%H:%M:%S").to_string(),
        "endTime": booking.end_time.format("%H:%M:%S").to_string(),
        "totalPrice": booking.total_price,
        "tax": booking.tax,
    });
    if let Value::Object(map) = &mut payload {
        for (addon, qty) in booking.addons.iter() {
            map.insert(addon.summary_key().to_string(), json!(qty));
        }
    }
    payload
}

/// Reacts to bus events with customer messages and outbound webhooks.
pub struct AutomationListener {
    state: ServiceState,
    ctx: ServiceContext,
    notifications: NotificationService,
}

impl AutomationListener {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            notifications: NotificationService::new(ctx.clone()),
            ctx,
        }
    }

    /// Handle one event. Events without side effects are ignored.
    pub async fn handle(&self, event: &AppEvent) -> CbResult<()> {
        self.handle_at(event, Utc::now()).await
    }

    pub async fn handle_at(&self, event: &AppEvent, now: DateTime<Utc>) -> CbResult<()> {
        match event {
            AppEvent::BookingCreated { booking_id, .. } => {
                let booking = self.load_booking(booking_id)?;
                // The webhook does not depend on the customer being reachable.
                self.post_webhook(&booking);
                self.send_confirmation(&booking, now).await
            }
            AppEvent::BookingRescheduled { booking_id, .. } => {
                let booking = self.load_booking(booking_id)?;
                self.send_reschedule_notice(&booking, now).await
            }
            AppEvent::BookingCancelled { booking_id, .. } => {
                let booking = self.load_booking(booking_id)?;
                self.send_cancellation_notice(&booking, now).await
            }
            AppEvent::LeadCreated { lead_id, .. } => self.reach_out_to_lead(lead_id, now).await,
            other => {
                debug!("automation: nothing to do for {}", event_label(other));
                Ok(())
            }
        }
    }

    fn load_booking(&self, booking_id: &str) -> CbResult<Booking> {
        let conn = self.ctx.database.conn()?;
        Booking::find_by_booking_id(&conn, booking_id)?.ok_or_else(|| CbError::not_found("booking", booking_id))
    }

    async fn send_confirmation(&self, booking: &Booking, now: DateTime<Utc>) -> CbResult<()> {
        let Some(phone) = booking.phone_number.as_deref() else {
            debug!("booking {} has no phone; skipping confirmation", booking.booking_id);
            return Ok(());
        };
        let business = self.ctx.business_by_row(booking.business_id)?;
        let invoice = {
            let conn = self.ctx.database.conn()?;
            match booking.id {
                Some(id) => Invoice::find_by_booking(&conn, id)?,
                None => None,
            }
        };
        let Some(invoice) = invoice else {
            warn!("booking {} has no invoice; skipping confirmation", booking.booking_id);
            return Ok(());
        };

        let link = invoice_link(&self.ctx.config.app.base_url, &invoice.invoice_id);
        let body = notification::booking_confirmation_message(&business.name, &booking.first_name, invoice.amount, &link);
        self.notifications
            .notify_customer_at(
                &business,
                notification_kind::BOOKING_CONFIRMATION,
                &booking.booking_id,
                phone,
                &body,
                now,
            )
            .await?;
        Ok(())
    }

    async fn send_reschedule_notice(&self, booking: &Booking, now: DateTime<Utc>) -> CbResult<()> {
        let Some(phone) = booking.phone_number.as_deref() else {
            return Ok(());
        };
        let business = self.ctx.business_by_row(booking.business_id)?;
        let body = notification::reschedule_message(
            &business.name,
            &booking.first_name,
            booking.cleaning_date,
            booking.start_time,
        );
        let moved_at = booking.rescheduled_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let key = format!("{}:{}", booking.booking_id, moved_at);
        self.notifications
            .notify_customer_at(&business, notification_kind::RESCHEDULED, &key, phone, &body, now)
            .await?;
        Ok(())
    }

    async fn send_cancellation_notice(&self, booking: &Booking, now: DateTime<Utc>) -> CbResult<()> {
        let Some(phone) = booking.phone_number.as_deref() else {
            return Ok(());
        };
        let business = self.ctx.business_by_row(booking.business_id)?;
        let body = notification::cancellation_message(&business.name, &booking.first_name, booking.cleaning_date);
        self.notifications
            .notify_customer_at(&business, notification_kind::CANCELLED, &booking.booking_id, phone, &body, now)
            .await?;
        Ok(())
    }

    async fn reach_out_to_lead(&self, lead_id: &str, now: DateTime<Utc>) -> CbResult<()> {
        let lead = {
            let conn = self.ctx.database.conn()?;
            Lead::find_by_lead_id(&conn, lead_id)?.ok_or_else(|| CbError::not_found("lead", lead_id))?
        };
        let Some(phone) = lead.phone_number.as_deref() else {
            debug!("lead {lead_id} has no phone; skipping outreach");
            return Ok(());
        };
        let business = self.ctx.business_by_row(lead.business_id)?;
        let body = notification::lead_outreach_message(&business.name, &lead.name);

        let delivery = self
            .notifications
            .notify_customer_at(&business, notification_kind::LEAD_OUTREACH, &lead.lead_id, phone, &body, now)
            .await?;
        if !matches!(delivery, Delivery::AlreadySent) {
            if let Some(id) = lead.id {
                let conn = self.ctx.database.conn()?;
                Lead::mark_contacted(&conn, id, now)?;
            }
            info!("lead {lead_id} contacted");
        }
        Ok(())
    }

    /// Post the booking to the configured webhook without waiting for it.
    fn post_webhook(&self, booking: &Booking) {
        let Some(sink) = self.ctx.webhook.clone() else {
            return;
        };
        let payload = booking_webhook_payload(booking);
        let booking_id = booking.booking_id.clone();
        tokio::spawn(async move {
            match sink.deliver(&payload).await {
                Ok(()) => info!("booking {booking_id} sent to webhook"),
                Err(e) => warn!("booking webhook for {booking_id} failed: {e}"),
            }
        });
    }

    /// Consume the bus on a background task until it closes.
    pub fn spawn(listener: Arc<AutomationListener>, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = listener.handle(&event).await {
                            error!("automation error on {}: {e}", event_label(&event));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("automation listener lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("automation: event bus closed");
                        break;
                    }
                }
            }
        })
    }

    /// Handle whatever is queued on `rx` right now, then return.
    pub async fn drain(&self, rx: &mut broadcast::Receiver<AppEvent>) -> usize {
        let mut handled = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if let Err(e) = self.handle(&event).await {
                        warn!("automation error on {}: {e}", event_label(&event));
                    }
                    handled += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("automation drain lagged by {n} events");
                }
                Err(_) => break,
            }
        }
        handled
    }
}

impl Service for AutomationListener {
    fn name(&self) -> &str {
        "automation"
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
        self.state = ServiceState::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_models::Addon;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_webhook_payload_keys() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let mut booking = Booking::new(
            1,
            "Jane",
            date,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        );
        booking.booking_id = "BKabc12".into();
        booking.bedrooms = 3;
        booking.total_price = 212.5;
        booking.addons.set(Addon::Oven, 1);

        let payload = booking_webhook_payload(&booking);
        assert_eq!(payload["firstName"], "Jane");
        assert_eq!(payload["cleaningDate"], "2025-03-14");
        assert_eq!(payload["startTime"], "10:00:00");
        assert_eq!(payload["endTime"], "11:00:00");
        assert_eq!(payload["bedrooms"], 3);
        assert_eq!(payload["addonOvenCleaning"], 1);
        assert_eq!(payload["addonDishes"], 0);
        assert_eq!(payload["totalPrice"], 212.5);
    }
}
