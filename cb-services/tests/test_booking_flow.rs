//! Booking lifecycle integration tests.
//!
//! Tests quoting, cleaner assignment, availability and alternates,
//! coupons, rescheduling, cancellation and required-field checks against a
//! seeded business.

mod common;

use chrono::{Duration, NaiveDate};
use serde_json::json;

use cb_core::error::CbError;
use cb_models::models::coupon::{DISCOUNT_FIXED, DISCOUNT_PERCENTAGE};
use cb_models::{Coupon, Customer, Invoice};
use cb_services::booking::{BookingService, RescheduleOutcome};
use cb_services::coupon::CouponService;
use cb_services::event_bus::AppEvent;
use cb_services::pricing;
use cb_services::reminder::ReminderService;
use common::{test_now, TestEnv};

// ---- Quotes ----

#[test]
fn quote_uses_business_prices() {
    let env = TestEnv::new();
    let conn = env.db.conn().unwrap();
    let summary = env.summary("2025-03-14 10:00");

    let quote = pricing::quote(&conn, &env.business, None, &summary).unwrap();
    assert_eq!(quote.bedroom_total, 60.0);
    assert_eq!(quote.bathroom_total, 30.0);
    assert_eq!(quote.sqft_price, 50.0);
    assert_eq!(quote.sub_total, 140.0);
    assert_eq!(quote.tax, 14.0);
    assert_eq!(quote.total_amount, 154.0);
    assert_eq!(quote.service_type, "standard");
}

#[test]
fn quote_prefers_customer_overrides() {
    let env = TestEnv::new();
    let conn = env.db.conn().unwrap();
    let mut customer = Customer::new(env.business.id.unwrap(), "Jane");
    customer.email = Some("jane@example.com".into());
    customer.save(&conn).unwrap();
    let mut pricing_row = cb_models::CustomerPricing {
        id: None,
        customer_id: customer.id.unwrap(),
        overrides: Default::default(),
    };
    pricing_row.overrides.set(cb_models::PriceField::BedroomPrice, Some(10.0));
    pricing_row.save(&conn).unwrap();

    let quote = pricing::quote(&conn, &env.business, Some(&customer), &env.summary("x")).unwrap();
    assert!(quote.used_custom_pricing);
    assert_eq!(quote.bedroom_total, 30.0);
    assert_eq!(quote.total_amount, 121.0);
}

// ---- Booking ----

#[test]
fn booking_from_summary_creates_booking_invoice_and_customer() {
    let env = TestEnv::new();
    let mut rx = env.ctx.event_bus.subscribe();
    let service = BookingService::new(env.ctx.clone());

    let created = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();

    assert!(created.booking.booking_id.starts_with("BK"));
    assert_eq!(created.booking.cleaning_date.to_string(), "2025-03-14");
    assert_eq!(created.booking.start_time, common::hm(10, 0));
    assert_eq!(created.booking.end_time, common::hm(11, 0));
    assert_eq!(created.booking.total_price, 154.0);
    assert_eq!(created.booking.phone_number.as_deref(), Some("+15125550100"));
    assert_eq!(created.cleaner_name.as_deref(), Some("Alice"));
    assert_eq!(created.invoice.amount, 154.0);
    assert!(!created.invoice.is_paid);

    let conn = env.db.conn().unwrap();
    let customer = Customer::find_by_contact(&conn, env.business.id.unwrap(), Some("+15125550100"), None)
        .unwrap()
        .expect("customer should be created");
    assert_eq!(created.booking.customer_id, customer.id);
    let invoice = Invoice::find_by_booking(&conn, created.booking.id.unwrap()).unwrap().unwrap();
    assert_eq!(invoice.invoice_id, created.invoice.invoice_id);

    assert!(matches!(rx.try_recv().unwrap(), AppEvent::BookingCreated { .. }));
    assert!(matches!(rx.try_recv().unwrap(), AppEvent::InvoiceCreated { amount, .. } if amount == 154.0));
}

#[test]
fn overlapping_bookings_fill_cleaners_then_fail() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let summary = env.summary("2025-03-14 10:00");

    let first = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    let second = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    assert_eq!(first.cleaner_name.as_deref(), Some("Alice"));
    assert_eq!(second.cleaner_name.as_deref(), Some("Bob"));

    let err = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap_err();
    assert!(matches!(err, CbError::Unavailable(_)));
    assert_eq!(err.to_string(), "No cleaners available for the requested time");
}

#[test]
fn half_hour_bookings_block_the_overlapping_hour() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let half_past = env.summary("2025-03-14 10:30");
    service.book_from_summary_at(&env.business, &half_past, test_now()).unwrap();
    service.book_from_summary_at(&env.business, &half_past, test_now()).unwrap();

    let check = service
        .availability()
        .check_availability_at(&env.business, "2025-03-14 10:00", test_now())
        .unwrap();
    assert!(!check.available);
    assert_eq!(check.alternative_slots.first().map(String::as_str), Some("2025-03-14 12:00:00"));

    let err = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap_err();
    assert!(matches!(err, CbError::Unavailable(_)));

    let noon = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 12:00"), test_now())
        .unwrap();
    assert_eq!(noon.cleaner_name.as_deref(), Some("Alice"));
}

#[test]
fn explicit_cleaner_is_used_when_free() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let summary = env.summary("2025-03-14 10:00");
    let bob = env.cleaners[1].id;

    let created = service.book_with_cleaner_at(&env.business, &summary, bob, test_now()).unwrap();
    assert_eq!(created.cleaner_name.as_deref(), Some("Bob"));
    assert_eq!(created.booking.cleaner_id, bob);

    let err = service.book_with_cleaner_at(&env.business, &summary, bob, test_now()).unwrap_err();
    assert!(matches!(err, CbError::Unavailable(_)));
    assert_eq!(err.to_string(), "Bob is not available for the requested time");

    // Alice is still free for the same hour.
    let other = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    assert_eq!(other.cleaner_name.as_deref(), Some("Alice"));

    let err = service
        .book_with_cleaner_at(&env.business, &summary, Some(9999), test_now())
        .unwrap_err();
    assert!(matches!(err, CbError::NotFound { .. }));
}

#[test]
fn availability_offers_alternates_when_full() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let summary = env.summary("2025-03-14 10:00");
    service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();

    let check = service
        .availability()
        .check_availability_at(&env.business, "2025-03-14 10:30", test_now())
        .unwrap();
    assert!(check.available, "Bob is still free");

    service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    let check = service
        .availability()
        .check_availability_at(&env.business, "2025-03-14 10:30", test_now())
        .unwrap();
    assert!(!check.available);
    assert_eq!(check.timeslot, "2025-03-14 10:00:00");
    assert_eq!(
        check.alternative_slots,
        vec!["2025-03-14 11:00:00", "2025-03-14 12:00:00", "2025-03-14 13:00:00"]
    );
}

#[test]
fn weekend_has_no_cleaners() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let check = service
        .availability()
        .check_availability_at(&env.business, "2025-03-15 10:00", test_now())
        .unwrap();
    assert!(!check.available);
    assert_eq!(check.alternative_slots[0], "2025-03-17 09:00:00");
}

#[test]
fn missing_fields_are_listed() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let mut summary = env.summary("2025-03-14 10:00");
    summary["city"] = json!("");
    summary.as_object_mut().unwrap().remove("squareFeet");

    let err = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap_err();
    assert_eq!(err.to_string(), "Missing required fields: city, squareFeet");
}

#[test]
fn coupon_discount_is_applied_and_redeemed() {
    let env = TestEnv::new();
    let coupons = CouponService::new(env.ctx.clone());
    let mut coupon = Coupon::new(env.business.id.unwrap(), "SPRING10", DISCOUNT_PERCENTAGE, 10.0);
    coupons.create(&mut coupon).unwrap();

    let mut summary = env.summary("2025-03-14 10:00");
    summary["couponCode"] = json!("SPRING10");
    let created = BookingService::new(env.ctx.clone())
        .book_from_summary_at(&env.business, &summary, test_now())
        .unwrap();

    assert_eq!(created.discount, 15.4);
    assert_eq!(created.booking.total_price, 138.6);
    assert_eq!(created.invoice.amount, 138.6);

    let conn = env.db.conn().unwrap();
    let stored = Coupon::find_by_code(&conn, env.business.id.unwrap(), "SPRING10").unwrap().unwrap();
    assert_eq!(stored.times_used, 1);
}

#[tokio::test]
async fn fully_discounted_booking_is_paid_and_kept() {
    let env = TestEnv::new();
    let mut coupon = Coupon::new(env.business.id.unwrap(), "ONTHEHOUSE", DISCOUNT_FIXED, 1000.0);
    CouponService::new(env.ctx.clone()).create(&mut coupon).unwrap();

    let mut summary = env.summary("2025-03-14 10:00");
    summary["couponCode"] = json!("ONTHEHOUSE");
    let created = BookingService::new(env.ctx.clone())
        .book_from_summary_at(&env.business, &summary, test_now())
        .unwrap();
    assert_eq!(created.booking.total_price, 0.0);
    assert_eq!(created.invoice.amount, 0.0);
    assert!(created.invoice.is_paid);

    let conn = env.db.conn().unwrap();
    let stored = Invoice::find_by_invoice_id(&conn, &created.invoice.invoice_id).unwrap().unwrap();
    assert!(stored.is_paid);
    drop(conn);

    let report = ReminderService::new(env.ctx.clone())
        .run_all(test_now() + Duration::minutes(200))
        .await
        .unwrap();
    assert!(report.payment_reminders.is_empty());
    assert!(report.released.is_empty());
}

#[test]
fn coupon_expiry_is_checked_against_today_not_the_appointment() {
    let env = TestEnv::new();
    let coupons = CouponService::new(env.ctx.clone());
    let business_id = env.business.id.unwrap();

    // test_now() is 2025-03-12 in Chicago.
    let mut last_day = Coupon::new(business_id, "LASTDAY", DISCOUNT_PERCENTAGE, 10.0);
    last_day.expiry_date = NaiveDate::from_ymd_opt(2025, 3, 12);
    coupons.create(&mut last_day).unwrap();
    let mut gone = Coupon::new(business_id, "GONE", DISCOUNT_PERCENTAGE, 10.0);
    gone.expiry_date = NaiveDate::from_ymd_opt(2025, 3, 11);
    coupons.create(&mut gone).unwrap();

    let service = BookingService::new(env.ctx.clone());
    let mut summary = env.summary("2025-03-17 10:00");
    summary["couponCode"] = json!("LASTDAY");
    let created = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    assert_eq!(created.discount, 15.4);

    summary["couponCode"] = json!("GONE");
    let err = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap_err();
    assert_eq!(err.to_string(), "This coupon has expired");
}

// ---- Changes ----

#[test]
fn reschedule_keeps_cleaner_and_emits_event() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let created = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();
    let mut rx = env.ctx.event_bus.subscribe();

    let outcome = service
        .reschedule_at(&env.business, &created.booking.booking_id, "2025-03-14 14:00", Some("dentist"), test_now())
        .unwrap();
    let RescheduleOutcome::Moved(moved) = outcome else {
        panic!("expected the booking to move");
    };
    assert_eq!(moved.start_time, common::hm(14, 0));
    assert_eq!(moved.cleaner_id, created.booking.cleaner_id);
    assert_eq!(moved.rescheduled_reason.as_deref(), Some("dentist"));
    assert!(matches!(rx.try_recv().unwrap(), AppEvent::BookingRescheduled { .. }));
}

#[test]
fn reschedule_into_full_slot_suggests_alternates() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let busy = env.summary("2025-03-14 15:00");
    service.book_from_summary_at(&env.business, &busy, test_now()).unwrap();
    service.book_from_summary_at(&env.business, &busy, test_now()).unwrap();
    let mine = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 09:00"), test_now())
        .unwrap();

    let outcome = service
        .reschedule_at(&env.business, &mine.booking.booking_id, "2025-03-14 15:00", None, test_now())
        .unwrap();
    match outcome {
        RescheduleOutcome::Unavailable { alternative_slots } => {
            assert_eq!(alternative_slots.first().map(String::as_str), Some("2025-03-14 16:00:00"));
        }
        RescheduleOutcome::Moved(_) => panic!("slot is full"),
    }
}

#[test]
fn cancel_frees_the_slot() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let summary = env.summary("2025-03-14 10:00");
    let first = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();

    let cancelled = service
        .cancel_at(&env.business, &first.booking.booking_id, Some("moving"), test_now())
        .unwrap();
    assert!(cancelled.is_cancelled());

    let again = service.book_from_summary_at(&env.business, &summary, test_now()).unwrap();
    assert_eq!(again.cleaner_name.as_deref(), Some("Alice"));

    let err = service
        .cancel_at(&env.business, &first.booking.booking_id, None, test_now())
        .unwrap_err();
    assert_eq!(err.to_string(), "Booking is already cancelled");
}

#[test]
fn bookings_of_another_business_are_not_found() {
    let env = TestEnv::new();
    let service = BookingService::new(env.ctx.clone());
    let created = service
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();

    let conn = env.db.conn().unwrap();
    let mut other = cb_models::Business::new("Other Co");
    other.save(&conn).unwrap();
    drop(conn);

    let err = service.get_for(&other, &created.booking.booking_id).unwrap_err();
    assert!(matches!(err, CbError::NotFound { .. }));
}
