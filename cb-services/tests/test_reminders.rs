//! Reminder and release sweep integration tests.

mod common;

use chrono::Duration;

use chrono::{TimeZone, Utc};

use cb_models::Invoice;
use cb_services::automation::AutomationListener;
use cb_services::booking::{BookingService, CreatedBooking};
use cb_services::event_bus::AppEvent;
use cb_services::invoice::InvoiceService;
use cb_services::lead::{LeadService, NewLead};
use cb_services::reminder::ReminderService;
use common::{test_now, TestEnv};

fn book(env: &TestEnv, when: &str) -> CreatedBooking {
    BookingService::new(env.ctx.clone())
        .book_from_summary_at(&env.business, &env.summary(when), test_now())
        .unwrap()
}

fn pay(env: &TestEnv, created: &CreatedBooking) {
    InvoiceService::new(env.ctx.clone())
        .record_payment_at(&created.invoice.invoice_id, 154.0, None, "COMPLETED", None, test_now())
        .unwrap();
}

#[tokio::test]
async fn unpaid_booking_is_reminded_once() {
    let env = TestEnv::new();
    let created = book(&env, "2025-03-14 10:00");
    let reminders = ReminderService::new(env.ctx.clone());

    let (early, _) = reminders.send_payment_reminders(test_now() + Duration::minutes(30)).await.unwrap();
    assert!(early.is_empty());

    let later = test_now() + Duration::minutes(121);
    let (sent, failures) = reminders.send_payment_reminders(later).await.unwrap();
    assert_eq!(sent, vec![created.booking.booking_id.clone()]);
    assert_eq!(failures, 0);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15125550100");
    assert!(texts[0].1.starts_with("REMINDER from Sparkle Cleaning"));
    assert!(texts[0].1.contains(&created.invoice.invoice_id));

    let booking = BookingService::new(env.ctx.clone()).get(&created.booking.booking_id).unwrap();
    assert_eq!(booking.payment_reminder_sent_at, Some(later));

    let (again, _) = reminders.send_payment_reminders(later + Duration::minutes(5)).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(env.messenger.sent().len(), 1);
}

#[tokio::test]
async fn reminded_booking_is_released_when_still_unpaid() {
    let env = TestEnv::new();
    let created = book(&env, "2025-03-14 10:00");
    let reminders = ReminderService::new(env.ctx.clone());

    // Not reminded yet, so nothing to release.
    let released = reminders.release_unpaid_bookings(test_now() + Duration::hours(4)).await.unwrap();
    assert!(released.is_empty());

    reminders.send_payment_reminders(test_now() + Duration::minutes(121)).await.unwrap();
    let released = reminders
        .release_unpaid_bookings(test_now() + Duration::minutes(181))
        .await
        .unwrap();
    assert_eq!(released, vec![created.booking.booking_id.clone()]);

    let conn = env.db.conn().unwrap();
    assert!(Invoice::find_by_invoice_id(&conn, &created.invoice.invoice_id).unwrap().is_none());
    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].1.contains("slot has been released"));
}

#[tokio::test]
async fn paid_booking_is_never_reminded_or_released() {
    let env = TestEnv::new();
    let created = book(&env, "2025-03-14 10:00");
    InvoiceService::new(env.ctx.clone())
        .record_payment_at(&created.invoice.invoice_id, 154.0, None, "COMPLETED", None, test_now())
        .unwrap();

    let report = ReminderService::new(env.ctx.clone())
        .run_all(test_now() + Duration::hours(5))
        .await
        .unwrap();
    assert!(report.payment_reminders.is_empty());
    assert!(report.released.is_empty());
    assert!(env.messenger.sent().is_empty());
}

#[tokio::test]
async fn appointment_reminder_goes_to_paid_bookings_in_window() {
    let env = TestEnv::new();
    let paid = book(&env, "2025-03-13 09:00");
    let unpaid = book(&env, "2025-03-13 09:00");
    let far = book(&env, "2025-03-17 09:00");
    let invoices = InvoiceService::new(env.ctx.clone());
    for created in [&paid, &far] {
        invoices
            .record_payment_at(&created.invoice.invoice_id, 154.0, None, "COMPLETED", None, test_now())
            .unwrap();
    }

    let reminders = ReminderService::new(env.ctx.clone());
    let (sent, failures) = reminders.send_appointment_reminders(test_now()).await.unwrap();
    assert_eq!(sent, vec![paid.booking.booking_id.clone()]);
    assert_eq!(failures, 0);
    assert_ne!(unpaid.booking.booking_id, paid.booking.booking_id);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("Thursday, March 13, 2025 at 9:00 AM"));
    assert!(texts[0].1.contains("+15125550199"));

    let (again, _) = reminders.send_appointment_reminders(test_now() + Duration::hours(1)).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn failed_sms_is_counted_and_retried() {
    let env = TestEnv::new();
    let created = book(&env, "2025-03-14 10:00");
    let reminders = ReminderService::new(env.ctx.clone());
    let later = test_now() + Duration::minutes(121);

    env.messenger.fail_sms(true);
    let (sent, failures) = reminders.send_payment_reminders(later).await.unwrap();
    assert!(sent.is_empty());
    assert_eq!(failures, 1);

    env.messenger.fail_sms(false);
    let (sent, _) = reminders.send_payment_reminders(later).await.unwrap();
    assert_eq!(sent, vec![created.booking.booking_id]);
}

#[tokio::test]
async fn late_sweep_reminds_before_releasing() {
    let env = TestEnv::new();
    let created = book(&env, "2025-03-14 10:00");
    let reminders = ReminderService::new(env.ctx.clone());

    // Both thresholds have passed, but the customer has not been warned yet.
    let first = reminders.run_all(test_now() + Duration::minutes(200)).await.unwrap();
    assert_eq!(first.payment_reminders, vec![created.booking.booking_id.clone()]);
    assert!(first.released.is_empty());

    let early = reminders.run_all(test_now() + Duration::minutes(230)).await.unwrap();
    assert!(early.released.is_empty());

    let later = reminders.run_all(test_now() + Duration::minutes(260)).await.unwrap();
    assert_eq!(later.released, vec![created.booking.booking_id.clone()]);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].1.starts_with("REMINDER from Sparkle Cleaning"));
    assert!(texts[1].1.contains("slot has been released"));
}

#[tokio::test]
async fn final_reminder_goes_out_an_hour_before() {
    let env = TestEnv::new();
    // test_now() is 10:00 in Chicago.
    let soon = book(&env, "2025-03-12 11:30");
    let later = book(&env, "2025-03-12 13:00");
    pay(&env, &soon);
    pay(&env, &later);

    let reminders = ReminderService::new(env.ctx.clone());
    let (sent, failures) = reminders.send_final_reminders(test_now()).await.unwrap();
    assert_eq!(sent, vec![soon.booking.booking_id.clone()]);
    assert_eq!(failures, 0);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15125550100");
    assert!(texts[0].1.starts_with("REMINDER: Your Sparkle Cleaning cleaning service begins in 1 hour at 11:30 AM."));
    assert!(texts[0].1.contains("+15125550199"));

    let (again, _) = reminders.send_final_reminders(test_now() + Duration::minutes(10)).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn cleaner_is_reminded_the_day_before() {
    let env = TestEnv::new();
    {
        let conn = env.db.conn().unwrap();
        let mut alice = env.cleaners[0].clone();
        alice.phone = Some("+15125550177".into());
        alice.save(&conn).unwrap();
    }
    let created = book(&env, "2025-03-13 09:00");
    assert_eq!(created.cleaner_name.as_deref(), Some("Alice"));
    pay(&env, &created);
    // Bob has no phone, so his booking is skipped.
    let bobs = book(&env, "2025-03-13 09:00");
    pay(&env, &bobs);

    let reminders = ReminderService::new(env.ctx.clone());
    let (sent, failures) = reminders.send_cleaner_reminders(test_now()).await.unwrap();
    assert_eq!(sent, vec![created.booking.booking_id.clone()]);
    assert_eq!(failures, 0);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15125550177");
    assert_eq!(
        texts[0].1,
        "Reminder from Sparkle Cleaning: you are cleaning for Jane Doe at 1 Main St, Austin on Thursday, March 13, 2025 at 9:00 AM."
    );

    let (again, _) = reminders.send_cleaner_reminders(test_now() + Duration::hours(1)).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn completed_booking_gets_a_follow_up_next_day() {
    let env = TestEnv::new();
    let yesterday = book(&env, "2025-03-11 10:00");
    let untouched = book(&env, "2025-03-11 13:00");
    let bookings = BookingService::new(env.ctx.clone());
    bookings.complete(&env.business, &yesterday.booking.booking_id).unwrap();

    let reminders = ReminderService::new(env.ctx.clone());
    let (sent, failures) = reminders.send_follow_ups(test_now()).await.unwrap();
    assert_eq!(sent, vec![yesterday.booking.booking_id.clone()]);
    assert_eq!(failures, 0);
    assert_ne!(untouched.booking.booking_id, yesterday.booking.booking_id);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.starts_with("Thank you for choosing Sparkle Cleaning!"));
    assert!(texts[0].1.contains(&format!("/feedback/{}/", yesterday.booking.booking_id)));
    assert!(texts[0].1.contains(&format!("/book/{}/", env.business.business_id)));

    let (again, _) = reminders.send_follow_ups(test_now() + Duration::hours(2)).await.unwrap();
    assert!(again.is_empty());

    // Two days later the booking is no longer "yesterday".
    let other = book(&env, "2025-03-11 15:00");
    bookings.complete(&env.business, &other.booking.booking_id).unwrap();
    let thursday = Utc.with_ymd_and_hms(2025, 3, 13, 15, 0, 0).unwrap();
    let (late, _) = reminders.send_follow_ups(thursday).await.unwrap();
    assert!(late.is_empty());
}

#[tokio::test]
async fn waiting_lead_is_called_after_time_to_wait() {
    let env = TestEnv::new();
    {
        let conn = env.db.conn().unwrap();
        let mut business = env.business.clone();
        business.use_call = true;
        business.time_to_wait = 10;
        business.save(&conn).unwrap();
    }
    let lead = LeadService::new(env.ctx.clone())
        .create_lead_at(
            &env.business,
            NewLead {
                name: "Sam".into(),
                phone_number: Some("+15125550142".into()),
                ..NewLead::default()
            },
            test_now(),
        )
        .unwrap();
    AutomationListener::new(env.ctx.clone())
        .handle_at(
            &AppEvent::LeadCreated {
                business_id: env.business.id.unwrap(),
                lead_id: lead.lead_id.clone(),
            },
            test_now(),
        )
        .await
        .unwrap();
    assert_eq!(env.messenger.sent().len(), 1);

    let reminders = ReminderService::new(env.ctx.clone());
    let (early, _) = reminders.call_waiting_leads(test_now() + Duration::minutes(5)).await.unwrap();
    assert!(early.is_empty());

    let (called, failures) = reminders.call_waiting_leads(test_now() + Duration::minutes(11)).await.unwrap();
    assert_eq!(called, vec![lead.lead_id.clone()]);
    assert_eq!(failures, 0);
    let calls = env.messenger.placed_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "+15125550142");

    let (again, _) = reminders.call_waiting_leads(test_now() + Duration::minutes(30)).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(env.messenger.placed_calls().len(), 1);
}
