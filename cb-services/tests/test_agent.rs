//! Booking agent integration tests against a scripted model.

mod common;

use serde_json::{json, Value};

use cb_api::FunctionCall;
use cb_core::constants::AGENT_FALLBACK_REPLY;
use cb_core::error::CbError;
use cb_services::agent::AgentService;
use cb_services::booking::BookingService;
use cb_services::event_bus::EventBus;
use cb_services::ServiceContext;
use common::{test_now, TestEnv};

const CLIENT: &str = "+15125550100";

#[tokio::test]
async fn plain_reply_is_stored_with_the_user_turn() {
    let env = TestEnv::new();
    env.llm.push_text("Hi! I can help you book a cleaning.");
    let agent = AgentService::new(env.ctx.clone());

    let reply = agent
        .handle_message_at(env.business_id(), CLIENT, "  Hello there ", test_now())
        .await
        .unwrap();
    assert_eq!(reply.reply, "Hi! I can help you book a cleaning.");
    assert!(reply.tools_used.is_empty());
    assert!(reply.booking_id.is_none());
    assert!(reply.chat_id.starts_with("CH"));

    let (chat, messages) = agent.transcript(&env.business, CLIENT).unwrap();
    assert_eq!(chat.chat_id, reply.chat_id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].message, "Hello there");
    assert!(messages[0].is_first_message);
    assert_eq!(messages[1].role, "assistant");
    assert!(!messages[1].is_first_message);

    let requests = env.llm.conversation_requests();
    assert_eq!(requests.len(), 1);
    let system = requests[0].messages[0].content.clone().unwrap();
    assert!(system.contains("Sparkle Cleaning"));
    assert!(system.contains("## PRICING"));
    assert_eq!(requests[0].tools.len(), 6);
}

#[tokio::test]
async fn second_message_reuses_the_chat_and_sends_history() {
    let env = TestEnv::new();
    env.llm.push_text("Hello!");
    env.llm.push_text("Sure, when works for you?");
    let agent = AgentService::new(env.ctx.clone());

    let first = agent.handle_message_at(env.business_id(), CLIENT, "Hi", test_now()).await.unwrap();
    let second = agent
        .handle_message_at(env.business_id(), CLIENT, "I need a deep clean", test_now())
        .await
        .unwrap();
    assert_eq!(first.chat_id, second.chat_id);

    let requests = env.llm.conversation_requests();
    let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);

    let (_, messages) = agent.transcript(&env.business, &first.chat_id).unwrap();
    assert_eq!(messages.iter().filter(|m| m.is_first_message).count(), 1);
    assert_eq!(agent.list_chats(&env.business, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn availability_tool_result_goes_back_to_the_model() {
    let env = TestEnv::new();
    env.llm
        .push_tool_call("call_1", "check_availability", json!({"date": "2025-03-14 11:00"}));
    env.llm.push_text("Friday at 11 AM is open!");
    let agent = AgentService::new(env.ctx.clone());

    let reply = agent
        .handle_message_at(env.business_id(), CLIENT, "Is Friday at 11 free?", test_now())
        .await
        .unwrap();
    assert_eq!(reply.reply, "Friday at 11 AM is open!");
    assert_eq!(reply.tools_used, vec!["check_availability".to_string()]);

    let requests = env.llm.conversation_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].tools.is_empty());
    let tool_turn = requests[1].messages.last().unwrap();
    assert_eq!(tool_turn.role, "tool");
    assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
    let result: Value = serde_json::from_str(tool_turn.content.as_deref().unwrap()).unwrap();
    assert_eq!(result["available"], true);
    assert_eq!(result["timeslot"], "2025-03-14 11:00:00");

    let (_, messages) = agent.transcript(&env.business, CLIENT).unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "tool", "assistant"]);
}

#[tokio::test]
async fn book_appointment_tool_books_from_the_extracted_summary() {
    let env = TestEnv::new();
    let agent = AgentService::new(env.ctx.clone());

    env.llm.push_text("Happy to help! What's your address?");
    agent
        .handle_message_at(env.business_id(), CLIENT, "I want a cleaning Friday at 10", test_now())
        .await
        .unwrap();

    env.llm.set_summary(env.summary("2025-03-14 10:00"));
    env.llm.push_tool_call("call_2", "bookAppointment", json!({}));
    env.llm.push_text("You're booked for Friday at 10 AM!");
    let reply = agent
        .handle_message_at(env.business_id(), CLIENT, "1 Main St, Austin. Book it.", test_now())
        .await
        .unwrap();

    assert_eq!(reply.tools_used, vec!["bookAppointment".to_string()]);
    let booking_id = reply.booking_id.clone().unwrap();
    assert!(booking_id.starts_with("BK"));

    let booking = BookingService::new(env.ctx.clone()).get(&booking_id).unwrap();
    assert_eq!(booking.first_name, "Jane");
    assert_eq!(booking.total_price, 154.0);

    let chat = agent.find_chat(&env.business, CLIENT).unwrap();
    assert_eq!(chat.summary_str("bookingId"), Some(booking_id.as_str()));
    assert_eq!(chat.summary_str("city"), Some("Austin"));
}

#[tokio::test]
async fn booking_with_incomplete_summary_reports_missing_fields() {
    let env = TestEnv::new();
    let agent = AgentService::new(env.ctx.clone());
    let mut chat = agent.get_or_create_chat(&env.business, CLIENT).unwrap();

    let call = FunctionCall {
        name: "bookAppointment".into(),
        arguments: "{}".into(),
    };
    let out = agent.execute_tool(&env.business, &mut chat, &call, test_now()).await;
    let result: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().starts_with("Missing required fields: firstName"));
}

#[tokio::test]
async fn malformed_tool_calls_get_error_lines() {
    let env = TestEnv::new();
    let agent = AgentService::new(env.ctx.clone());
    let mut chat = agent.get_or_create_chat(&env.business, CLIENT).unwrap();

    let call = |name: &str, arguments: &str| FunctionCall {
        name: name.into(),
        arguments: arguments.into(),
    };

    let out = agent
        .execute_tool(&env.business, &mut chat, &call("send_fax", "{}"), test_now())
        .await;
    assert_eq!(out, "Error: Tool 'send_fax' not found");

    let out = agent
        .execute_tool(&env.business, &mut chat, &call("check_availability", "{not json"), test_now())
        .await;
    assert_eq!(out, "Error: Invalid JSON in tool arguments");

    let out = agent
        .execute_tool(&env.business, &mut chat, &call("check_availability", "{}"), test_now())
        .await;
    assert_eq!(out, "Error: Missing date parameter for check_availability");

    let out = agent
        .execute_tool(&env.business, &mut chat, &call("current_time", ""), test_now())
        .await;
    assert!(out.starts_with("2025-03-12 10:00 AM (Wednesday)"), "{out}");
}

#[tokio::test]
async fn failed_follow_up_falls_back_to_a_canned_reply() {
    let env = TestEnv::new();
    // Only the tool-calling turn is scripted, so the follow-up call errors.
    env.llm.push_tool_call("call_3", "current_time", json!({}));
    let agent = AgentService::new(env.ctx.clone());

    let reply = agent
        .handle_message_at(env.business_id(), CLIENT, "What time is it?", test_now())
        .await
        .unwrap();
    assert_eq!(reply.reply, AGENT_FALLBACK_REPLY);
    assert_eq!(reply.tools_used, vec!["current_time".to_string()]);
}

#[tokio::test]
async fn rejected_turns() {
    let env = TestEnv::new();
    let agent = AgentService::new(env.ctx.clone());

    let err = agent
        .handle_message_at(env.business_id(), CLIENT, "   ", test_now())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Message is required");

    let err = agent
        .handle_message_at("BUS-9999", CLIENT, "Hi", test_now())
        .await
        .unwrap_err();
    assert!(matches!(err, CbError::NotFound { .. }));

    let err = agent.get_or_create_chat(&env.business, " ").unwrap_err();
    assert_eq!(err.to_string(), "Client key is required");

    let bare = ServiceContext::new(Default::default(), env.db.clone(), EventBus::new(8));
    let err = AgentService::new(bare)
        .handle_message_at(env.business_id(), CLIENT, "Hi", test_now())
        .await
        .unwrap_err();
    assert!(matches!(err, CbError::MissingConfig(_)));
}

#[tokio::test]
async fn deleting_a_chat_removes_its_transcript() {
    let env = TestEnv::new();
    env.llm.push_text("Hello!");
    let agent = AgentService::new(env.ctx.clone());
    let reply = agent.handle_message_at(env.business_id(), CLIENT, "Hi", test_now()).await.unwrap();

    agent.delete_chat(&env.business, &reply.chat_id).unwrap();
    assert!(matches!(
        agent.find_chat(&env.business, CLIENT),
        Err(CbError::NotFound { .. })
    ));
}
