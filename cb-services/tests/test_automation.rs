//! Event-driven automation integration tests: confirmations, notices and
//! lead outreach.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cb_models::Lead;
use cb_services::automation::AutomationListener;
use cb_services::booking::BookingService;
use cb_services::event_bus::AppEvent;
use cb_services::lead::{LeadService, NewLead};
use common::{test_now, TestEnv};

fn new_lead(phone: Option<&str>) -> NewLead {
    NewLead {
        name: "Sam".into(),
        email: Some("sam@example.com".into()),
        phone_number: phone.map(str::to_string),
        source: Some("website".into()),
        ..NewLead::default()
    }
}

#[tokio::test]
async fn booking_confirmation_is_sent_once_per_booking() {
    let env = TestEnv::new();
    let mut rx = env.ctx.event_bus.subscribe();
    let created = BookingService::new(env.ctx.clone())
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();

    let listener = AutomationListener::new(env.ctx.clone());
    let handled = listener.drain(&mut rx).await;
    assert!(handled >= 1);

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15125550100");
    assert!(texts[0].1.starts_with("Hello Jane, your appointment with Sparkle Cleaning is confirmed!"));
    assert!(texts[0].1.contains("$154.00"));
    assert!(texts[0].1.contains(&created.invoice.invoice_id));

    // Replaying the event does not text again.
    listener
        .handle_at(
            &AppEvent::BookingCreated {
                business_id: env.business.id.unwrap(),
                booking_id: created.booking.booking_id.clone(),
            },
            test_now(),
        )
        .await
        .unwrap();
    assert_eq!(env.messenger.sent().len(), 1);
}

#[tokio::test]
async fn each_booking_is_posted_to_the_webhook() {
    let env = TestEnv::new();
    let mut rx = env.ctx.event_bus.subscribe();
    let bookings = BookingService::new(env.ctx.clone());
    let morning = bookings
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();
    let afternoon = bookings
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 14:00"), test_now())
        .unwrap();

    AutomationListener::new(env.ctx.clone()).drain(&mut rx).await;
    let payloads = env.webhook.wait_for(2).await;
    assert_eq!(payloads.len(), 2);

    let ids: Vec<&str> = payloads.iter().filter_map(|p| p["bookingId"].as_str()).collect();
    assert!(ids.contains(&morning.booking.booking_id.as_str()));
    assert!(ids.contains(&afternoon.booking.booking_id.as_str()));
    let first = payloads
        .iter()
        .find(|p| p["bookingId"] == morning.booking.booking_id.as_str())
        .unwrap();
    assert_eq!(first["firstName"], "Jane");
    assert_eq!(first["cleaningDate"], "2025-03-14");
    assert_eq!(first["startTime"], "10:00:00");
    assert_eq!(first["totalPrice"], 154.0);
}

#[tokio::test]
async fn webhook_is_posted_when_confirmation_cannot_be_sent() {
    let env = TestEnv::new();
    let quiet = env.business_without_sms();
    let created = BookingService::new(env.ctx.clone())
        .book_from_summary_at(&quiet, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();

    let result = AutomationListener::new(env.ctx.clone())
        .handle_at(
            &AppEvent::BookingCreated {
                business_id: quiet.id.unwrap(),
                booking_id: created.booking.booking_id.clone(),
            },
            test_now(),
        )
        .await;
    assert!(result.is_err());
    assert!(env.messenger.sent().is_empty());

    let payloads = env.webhook.wait_for(1).await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["bookingId"], created.booking.booking_id.as_str());
}

#[tokio::test]
async fn cancellation_sends_a_notice() {
    let env = TestEnv::new();
    let bookings = BookingService::new(env.ctx.clone());
    let created = bookings
        .book_from_summary_at(&env.business, &env.summary("2025-03-14 10:00"), test_now())
        .unwrap();
    let mut rx = env.ctx.event_bus.subscribe();
    bookings
        .cancel_at(&env.business, &created.booking.booking_id, Some("moving"), test_now())
        .unwrap();

    AutomationListener::new(env.ctx.clone()).drain(&mut rx).await;
    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("Friday, March 14, 2025 has been cancelled"));
}

#[tokio::test]
async fn new_lead_is_texted_and_marked_contacted() {
    let env = TestEnv::new();
    let lead = LeadService::new(env.ctx.clone())
        .create_lead_at(&env.business, new_lead(Some("512-555-0142")), test_now())
        .unwrap();
    assert_eq!(lead.phone_number.as_deref(), Some("+15125550142"));

    let listener = AutomationListener::new(env.ctx.clone());
    listener
        .handle_at(
            &AppEvent::LeadCreated {
                business_id: env.business.id.unwrap(),
                lead_id: lead.lead_id.clone(),
            },
            test_now(),
        )
        .await
        .unwrap();

    let texts = env.messenger.sent();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15125550142");
    assert!(texts[0].1.starts_with("Hey Sam, thanks for reaching out to Sparkle Cleaning!"));

    let conn = env.db.conn().unwrap();
    let stored = Lead::find_by_lead_id(&conn, &lead.lead_id).unwrap().unwrap();
    assert_eq!(stored.email_sent_at, Some(test_now()));
}

#[tokio::test]
async fn lead_outreach_falls_back_to_a_call() {
    let env = TestEnv::new();
    {
        let conn = env.db.conn().unwrap();
        let mut business = env.business.clone();
        business.use_call = true;
        business.save(&conn).unwrap();
    }
    env.messenger.fail_sms(true);

    let lead = LeadService::new(env.ctx.clone())
        .create_lead_at(&env.business, new_lead(Some("+15125550142")), test_now())
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

    assert!(env.messenger.sent().is_empty());
    let calls = env.messenger.placed_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "+15125550142");
}

#[tokio::test]
async fn lead_without_phone_is_left_alone() {
    let env = TestEnv::new();
    let lead = LeadService::new(env.ctx.clone())
        .create_lead_at(&env.business, new_lead(None), test_now())
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

    assert!(env.messenger.sent().is_empty());
    let conn = env.db.conn().unwrap();
    let stored = Lead::find_by_lead_id(&conn, &lead.lead_id).unwrap().unwrap();
    assert!(stored.email_sent_at.is_none());
}

#[tokio::test]
async fn spawned_listener_reacts_to_published_events() {
    let env = TestEnv::new();
    let handle = AutomationListener::spawn(Arc::new(AutomationListener::new(env.ctx.clone())), &env.ctx.event_bus);

    LeadService::new(env.ctx.clone())
        .create_lead_at(&env.business, new_lead(Some("+15125550142")), test_now())
        .unwrap();

    for _ in 0..50 {
        if !env.messenger.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(env.messenger.sent().len(), 1);
    handle.abort();
}
