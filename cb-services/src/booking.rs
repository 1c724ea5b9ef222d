//! Booking lifecycle: create (with invoice), reschedule, cancel, complete.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use cb_core::constants::recurring;
use cb_core::error::{CbError, CbResult};
use cb_core::money::round_currency;
use cb_core::phone::normalize_or_keep;
use cb_models::queries::{self, BookingFilter};
use cb_models::{Booking, Business, Chat, Cleaner, Customer, Invoice};

use crate::availability::{self, AvailabilityService, Roster};
use crate::context::ServiceContext;
use crate::coupon::{self, CouponService};
use crate::datetime::ParsedDateTime;
use crate::event_bus::AppEvent;
use crate::pricing::{self, summary_text, PriceBreakdown};
use crate::service::{Service, ServiceState};

/// Summary fields a chat must have gathered before it can book.
pub const REQUIRED_BOOKING_FIELDS: &[&str] = &[
    "firstName",
    "phoneNumber",
    "address1",
    "city",
    "state",
    "serviceType",
    "appointmentDateTime",
    "bedrooms",
    "bathrooms",
    "squareFeet",
];

/// Everything needed to place a booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    /// Local row id of the business.
    pub business_id: i64,
    /// Contact, property and add-on fields, keyed as in a chat summary.
    pub summary: Value,
    pub when: ParsedDateTime,
    pub customer_id: Option<i64>,
    /// Row id of a specific cleaner; otherwise one is picked.
    pub cleaner_id: Option<i64>,
    pub recurring: Option<String>,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
}

/// A stored booking with its invoice and quote.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub invoice: Invoice,
    pub breakdown: PriceBreakdown,
    pub discount: f64,
    pub cleaner_name: Option<String>,
}

/// Result of a reschedule attempt.
#[derive(Debug, Clone)]
pub enum RescheduleOutcome {
    Moved(Booking),
    Unavailable { alternative_slots: Vec<String> },
}

/// Names of required fields that are missing or blank.
pub fn missing_fields(summary: &Value) -> Vec<&'static str> {
    REQUIRED_BOOKING_FIELDS
        .iter()
        .copied()
        .filter(|key| pricing::is_blank(summary.get(*key)))
        .collect()
}

fn parse_yes(value: Option<String>) -> Option<bool> {
    value.map(|v| matches!(v.to_lowercase().as_str(), "yes" | "true" | "1"))
}

/// Booking fields carried by a summary.
fn booking_from_summary(business_id: i64, summary: &Value, when: &ParsedDateTime) -> CbResult<Booking> {
    let first_name = summary_text(summary, "firstName")
        .ok_or_else(|| CbError::Validation("Missing required fields: firstName".into()))?;

    let mut booking = Booking::new(business_id, first_name, when.date, when.start_time, when.end_time);
    booking.last_name = summary_text(summary, "lastName");
    booking.email = summary_text(summary, "email");
    booking.phone_number = summary_text(summary, "phoneNumber").map(|p| normalize_or_keep(&p));
    booking.address1 = summary_text(summary, "address1");
    booking.address2 = summary_text(summary, "address2");
    booking.city = summary_text(summary, "city");
    booking.state_or_province = summary_text(summary, "state")
        .or_else(|| summary_text(summary, "stateOrProvince"));
    booking.zip_code = summary_text(summary, "zipCode");
    booking.bedrooms = pricing::summary_quantity(summary, &["bedrooms"])?;
    booking.bathrooms = pricing::summary_quantity(summary, &["bathrooms"])?;
    booking.square_feet = pricing::summary_quantity(summary, &["squareFeet", "area"])?;
    booking.addons = pricing::addon_quantities(summary)?;
    booking.other_requests =
        summary_text(summary, "otherRequests").or_else(|| summary_text(summary, "additionalNotes"));
    booking.will_someone_be_home = parse_yes(summary_text(summary, "willSomeoneBeHome"));
    booking.key_location = summary_text(summary, "keyLocation");
    Ok(booking)
}

/// Pick the cleaner for a new slot: the requested one if free, else the
/// first free cleaner of the roster.
fn pick_cleaner<'r>(
    roster: &'r Roster,
    requested: Option<i64>,
    when: &ParsedDateTime,
) -> CbResult<&'r Cleaner> {
    match requested {
        Some(id) => {
            let cleaner = roster
                .cleaners
                .iter()
                .find(|c| c.id == Some(id))
                .ok_or_else(|| CbError::not_found("cleaner", id.to_string()))?;
            if roster.cleaner_is_free(cleaner, when.local) {
                Ok(cleaner)
            } else {
                Err(CbError::Unavailable(format!(
                    "{} is not available for the requested time",
                    cleaner.name
                )))
            }
        }
        None => availability::find_available_cleaner(roster, when.local)
            .ok_or_else(|| CbError::Unavailable("No cleaners available for the requested time".into())),
    }
}

/// Confirmation payload returned to the agent after booking.
pub fn booking_result_json(created: &CreatedBooking) -> Value {
    let b = &created.booking;
    json!({
        "success": true,
        "booking_id": b.booking_id,
        "message": "Appointment booked successfully",
        "data": {
            "bookingId": b.booking_id,
            "cleaningDate": b.cleaning_date.format("%Y-%m-%d").to_string(),
            "startTime": b.start_time.format("%H:%M").to_string(),
            "serviceType": b.service_type,
            "totalPrice": b.total_price,
            "customer_name": b.customer_name(),
        }
    })
}

/// Create, move, cancel and complete bookings.
pub struct BookingService {
    state: ServiceState,
    ctx: ServiceContext,
    availability: AvailabilityService,
}

impl BookingService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            availability: AvailabilityService::new(ctx.clone()),
            ctx,
        }
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn get(&self, booking_id: &str) -> CbResult<Booking> {
        let conn = self.ctx.database.conn()?;
        Booking::find_by_booking_id(&conn, booking_id)?
            .ok_or_else(|| CbError::not_found("booking", booking_id))
    }

    /// A booking that must belong to `business`.
    pub fn get_for(&self, business: &Business, booking_id: &str) -> CbResult<Booking> {
        let booking = self.get(booking_id)?;
        if Some(booking.business_id) != business.id {
            return Err(CbError::not_found("booking", booking_id));
        }
        Ok(booking)
    }

    pub fn list(&self, filter: &BookingFilter) -> CbResult<Vec<Booking>> {
        let conn = self.ctx.database.conn()?;
        queries::list_bookings(&conn, filter)
    }

    pub fn invoice_for(&self, booking: &Booking) -> CbResult<Option<Invoice>> {
        let conn = self.ctx.database.conn()?;
        match booking.id {
            Some(id) => Invoice::find_by_booking(&conn, id),
            None => Ok(None),
        }
    }

    // ─── Creation ────────────────────────────────────────────────────────

    pub fn create_booking(&self, request: BookingRequest) -> CbResult<CreatedBooking> {
        self.create_booking_at(request, Utc::now())
    }

    /// Price, assign and store a booking together with its invoice.
    ///
    /// Cleaner selection, the booking, its add-on lines, the invoice and any
    /// coupon redemption share one transaction.
    pub fn create_booking_at(&self, request: BookingRequest, now: DateTime<Utc>) -> CbResult<CreatedBooking> {
        let business = self.ctx.business_by_row(request.business_id)?;
        let mut booking = booking_from_summary(request.business_id, &request.summary, &request.when)?;

        booking.recurring = match request.recurring.as_deref().map(str::trim) {
            None | Some("") => recurring::ONE_TIME.to_string(),
            Some(r) if recurring::ALL.contains(&r) => r.to_string(),
            Some(r) => return Err(CbError::Validation(format!("Unknown recurring option: {r}"))),
        };
        booking.payment_method = request.payment_method.clone();
        booking.customer_id = request.customer_id;
        booking.created_at = now;
        let today = now.with_timezone(&self.availability.timezone_of(&business)).date_naive();

        let created = self.ctx.database.transaction(|conn| {
            let customer = match request.customer_id {
                Some(id) => Customer::find_by_id(conn, id)?,
                None => None,
            };
            let breakdown = pricing::quote(conn, &business, customer.as_ref(), &request.summary)?;

            let email = booking
                .email
                .clone()
                .or_else(|| customer.as_ref().and_then(|c| c.email.clone()));
            let redemption = match request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
                Some(code) => Some(coupon::resolve(
                    conn,
                    request.business_id,
                    code,
                    email.as_deref(),
                    breakdown.total_amount,
                    today,
                )?),
                None => None,
            };
            let discount = redemption.as_ref().map(|(_, d)| *d).unwrap_or(0.0);

            let roster = Roster::load(conn, &business, request.when.date, self.ctx.config.scheduling.slot_minutes)?;
            let cleaner = pick_cleaner(&roster, request.cleaner_id, &request.when)?;
            booking.cleaner_id = cleaner.id;

            booking.service_type = breakdown.service_type.clone();
            booking.total_price = round_currency((breakdown.total_amount - discount).max(0.0));
            booking.tax = breakdown.tax;
            booking.used_custom_pricing = breakdown.used_custom_pricing;
            let mut snapshot = serde_json::to_value(&breakdown)?;
            if let (Some(obj), Some((c, d))) = (snapshot.as_object_mut(), redemption.as_ref()) {
                obj.insert("coupon_code".into(), json!(c.code));
                obj.insert("discount".into(), json!(d));
            }
            booking.pricing_snapshot = Some(snapshot);

            let booking_row = booking.save(conn)?;
            let lines: Vec<(i64, i64)> = breakdown
                .custom_addon_lines
                .iter()
                .map(|l| (l.addon_id, l.qty))
                .collect();
            booking.set_custom_addon_lines(conn, &lines)?;

            let mut invoice = Invoice::new(booking_row, booking.total_price);
            invoice.created_at = now;
            let invoice_row = invoice.save(conn)?;
            // Nothing to collect on a fully discounted booking.
            let (_, paid) = Invoice::refresh_paid(conn, invoice_row)?;
            invoice.is_paid = paid;

            if let Some((mut c, _)) = redemption {
                CouponService::redeem(&mut c, conn, email.as_deref().unwrap_or_default(), now)?;
            }

            Ok(CreatedBooking {
                booking: booking.clone(),
                invoice,
                breakdown,
                discount,
                cleaner_name: Some(cleaner.name.clone()),
            })
        })?;

        info!(
            "booked {} for business {} on {} at {} ({})",
            created.booking.booking_id,
            business.business_id,
            created.booking.cleaning_date,
            created.booking.start_time,
            created.booking.total_price
        );

        self.ctx.event_bus.emit(AppEvent::BookingCreated {
            business_id: request.business_id,
            booking_id: created.booking.booking_id.clone(),
        });
        self.ctx.event_bus.emit(AppEvent::InvoiceCreated {
            invoice_id: created.invoice.invoice_id.clone(),
            booking_id: created.booking.booking_id.clone(),
            amount: created.invoice.amount,
        });

        Ok(created)
    }

    /// Find the customer behind a summary by phone or email, creating one if
    /// none exists. Blank fields on a found customer are filled in.
    pub fn upsert_customer(&self, conn: &Connection, business_id: i64, summary: &Value) -> CbResult<Customer> {
        let phone = summary_text(summary, "phoneNumber").map(|p| normalize_or_keep(&p));
        let email = summary_text(summary, "email");

        let mut customer = match Customer::find_by_contact(conn, business_id, phone.as_deref(), email.as_deref())? {
            Some(c) => c,
            None => Customer::new(business_id, summary_text(summary, "firstName").unwrap_or_default()),
        };

        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.as_deref().map_or(true, str::is_empty) {
                if let Some(v) = value {
                    *slot = Some(v);
                }
            }
        }
        fill(&mut customer.last_name, summary_text(summary, "lastName"));
        fill(&mut customer.email, email);
        fill(&mut customer.phone, phone);
        fill(&mut customer.address1, summary_text(summary, "address1"));
        fill(&mut customer.city, summary_text(summary, "city"));
        fill(&mut customer.state, summary_text(summary, "state"));
        fill(&mut customer.zip_code, summary_text(summary, "zipCode"));

        customer.save(conn)?;
        Ok(customer)
    }

    /// Book from a complete summary: checks required fields, parses the
    /// appointment time in the business timezone and links the customer.
    pub fn book_from_summary_at(
        &self,
        business: &Business,
        summary: &Value,
        now: DateTime<Utc>,
    ) -> CbResult<CreatedBooking> {
        self.book_with_cleaner_at(business, summary, None, now)
    }

    /// [`book_from_summary_at`](Self::book_from_summary_at) with the job
    /// pinned to one cleaner (row id) when `cleaner_id` is set.
    pub fn book_with_cleaner_at(
        &self,
        business: &Business,
        summary: &Value,
        cleaner_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> CbResult<CreatedBooking> {
        let missing = missing_fields(summary);
        if !missing.is_empty() {
            return Err(CbError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;

        let text = summary_text(summary, "appointmentDateTime").unwrap_or_default();
        let when = self.availability.parse_for(business, &text, now)?;

        // Fail before creating a customer when nobody can take the slot.
        let roster = self.availability.roster(business, when.date)?;
        pick_cleaner(&roster, cleaner_id, &when)?;

        let customer = {
            let conn = self.ctx.database.conn()?;
            self.upsert_customer(&conn, business_id, summary)?
        };

        self.create_booking_at(
            BookingRequest {
                business_id,
                summary: summary.clone(),
                when,
                customer_id: customer.id,
                cleaner_id,
                recurring: summary_text(summary, "recurring"),
                payment_method: summary_text(summary, "paymentMethod"),
                coupon_code: summary_text(summary, "couponCode"),
            },
            now,
        )
    }

    /// Book from a chat's summary and remember the booking id on the chat.
    pub fn book_chat_at(&self, business: &Business, chat: &mut Chat, now: DateTime<Utc>) -> CbResult<CreatedBooking> {
        let created = self.book_from_summary_at(business, &chat.summary, now)?;

        if !chat.summary.is_object() {
            chat.summary = json!({});
        }
        if let Some(obj) = chat.summary.as_object_mut() {
            obj.insert("bookingId".into(), json!(created.booking.booking_id));
        }
        chat.updated_at = now;
        let conn = self.ctx.database.conn()?;
        if let Err(e) = chat.save(&conn) {
            warn!("booked {} but could not store it on chat {}: {}", created.booking.booking_id, chat.chat_id, e);
        }
        Ok(created)
    }

    // ─── Changes ─────────────────────────────────────────────────────────

    pub fn reschedule(
        &self,
        business: &Business,
        booking_id: &str,
        new_time: &str,
        reason: Option<&str>,
    ) -> CbResult<RescheduleOutcome> {
        self.reschedule_at(business, booking_id, new_time, reason, Utc::now())
    }

    /// Move a booking. The same cleaner keeps it when free; otherwise any free
    /// cleaner takes it. With nobody free, nearby alternatives are suggested.
    pub fn reschedule_at(
        &self,
        business: &Business,
        booking_id: &str,
        new_time: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> CbResult<RescheduleOutcome> {
        let mut booking = self.get_for(business, booking_id)?;
        if booking.is_cancelled() {
            return Err(CbError::Validation("Cannot reschedule a cancelled booking".into()));
        }
        if booking.is_completed {
            return Err(CbError::Validation("Cannot reschedule a completed booking".into()));
        }

        let when = self.availability.parse_for(business, new_time, now)?;
        let roster = self
            .availability
            .roster(business, when.date)?
            .excluding_booking(&booking.booking_id);

        let current = roster
            .cleaners
            .iter()
            .find(|c| c.id.is_some() && c.id == booking.cleaner_id)
            .filter(|c| roster.cleaner_is_free(c, when.local));
        let Some(cleaner) = current.or_else(|| availability::find_available_cleaner(&roster, when.local)) else {
            let slot = availability::round_down_to_hour(when.local);
            let alternative_slots =
                availability::find_alternate_slots(&roster, slot, self.availability.search());
            info!("reschedule of {} to {} unavailable", booking.booking_id, when.local);
            return Ok(RescheduleOutcome::Unavailable { alternative_slots });
        };

        booking.cleaner_id = cleaner.id;
        booking.cleaning_date = when.date;
        booking.start_time = when.start_time;
        booking.end_time = when.end_time;
        booking.rescheduled_at = Some(now);
        if let Some(r) = reason.filter(|r| !r.trim().is_empty()) {
            booking.rescheduled_reason = Some(r.trim().to_string());
        }

        let conn = self.ctx.database.conn()?;
        booking.save(&conn)?;
        info!("rescheduled {} to {} {}", booking.booking_id, booking.cleaning_date, booking.start_time);

        self.ctx.event_bus.emit(AppEvent::BookingRescheduled {
            business_id: booking.business_id,
            booking_id: booking.booking_id.clone(),
        });
        Ok(RescheduleOutcome::Moved(booking))
    }

    pub fn cancel(&self, business: &Business, booking_id: &str, reason: Option<&str>) -> CbResult<Booking> {
        self.cancel_at(business, booking_id, reason, Utc::now())
    }

    /// Cancel a booking. Its slot frees up immediately.
    pub fn cancel_at(
        &self,
        business: &Business,
        booking_id: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> CbResult<Booking> {
        let mut booking = self.get_for(business, booking_id)?;
        if booking.is_cancelled() {
            return Err(CbError::Validation("Booking is already cancelled".into()));
        }
        booking.cancelled_at = Some(now);
        if let Some(r) = reason.filter(|r| !r.trim().is_empty()) {
            booking.cancelled_reason = Some(r.trim().to_string());
        }

        let conn = self.ctx.database.conn()?;
        booking.save(&conn)?;
        info!("cancelled {}", booking.booking_id);

        self.ctx.event_bus.emit(AppEvent::BookingCancelled {
            business_id: booking.business_id,
            booking_id: booking.booking_id.clone(),
        });
        Ok(booking)
    }

    pub fn complete(&self, business: &Business, booking_id: &str) -> CbResult<Booking> {
        let mut booking = self.get_for(business, booking_id)?;
        if booking.is_cancelled() {
            return Err(CbError::Validation("Cannot complete a cancelled booking".into()));
        }
        if booking.is_completed {
            return Ok(booking);
        }
        booking.is_completed = true;

        let conn = self.ctx.database.conn()?;
        booking.save(&conn)?;
        info!("completed {}", booking.booking_id);

        self.ctx.event_bus.emit(AppEvent::BookingCompleted {
            business_id: booking.business_id,
            booking_id: booking.booking_id.clone(),
        });
        Ok(booking)
    }

    /// Length of the appointment window.
    pub fn duration_minutes(booking: &Booking) -> i64 {
        let end = booking.cleaning_date.and_time(booking.end_time);
        let mut minutes = (end - booking.starts_at()).num_minutes();
        if minutes <= 0 {
            minutes += Duration::days(1).num_minutes();
        }
        minutes
    }
}

impl Service for BookingService {
    fn name(&self) -> &str {
        "bookings"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.availability.init()?;
        self.state = ServiceState::Running;
        Ok(())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.availability.shutdown()?;
        self.state = ServiceState::Stopped;
        Ok(())
    }
}
