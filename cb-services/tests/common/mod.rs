//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use serde_json::{json, Value};
use tempfile::TempDir;

use cb_api::response::Choice;
use cb_api::{
    ChatCompletion, ChatCompletionRequest, ChatCompletionResponse, FunctionCall, Messenger, ToolCall, WebhookSink,
    WireMessage,
};
use cb_core::config::{AppConfig, DatabaseConfig};
use cb_core::error::{CbError, CbResult};
use cb_models::{ApiCredential, Business, Cleaner, CleanerAvailability, Database};
use cb_services::event_bus::EventBus;
use cb_services::ServiceContext;

/// Create a temporary database with full schema and migrations applied.
/// Returns the Database and the TempDir (must be held alive for the duration of the test).
pub fn create_test_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test.db");
    let db = Database::init(&path, &DatabaseConfig::default()).expect("failed to init test database");
    (db, dir)
}

/// Wednesday 2025-03-12 15:00 UTC, 10:00 in Chicago.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, 15, 0, 0).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

// ---- Fake LLM ----

/// Chat-completions double. Conversation calls pop scripted responses in
/// order; summary extraction calls (JSON output) answer with `summary`.
#[derive(Default)]
pub struct FakeLlm {
    responses: Mutex<VecDeque<WireMessage>>,
    summary: Mutex<Value>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self {
            summary: Mutex::new(json!({})),
            ..Self::default()
        }
    }

    pub fn push_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(WireMessage::assistant(text));
    }

    /// Queue an assistant turn that calls one tool.
    pub fn push_tool_call(&self, id: &str, name: &str, arguments: Value) {
        self.responses.lock().unwrap().push_back(WireMessage {
            role: "assistant".into(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.into(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.to_string(),
                },
            }]),
            tool_call_id: None,
        });
    }

    pub fn set_summary(&self, summary: Value) {
        *self.summary.lock().unwrap() = summary;
    }

    pub fn conversation_requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.response_format.is_none())
            .cloned()
            .collect()
    }
}

fn response(message: WireMessage) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: "chatcmpl-test".into(),
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: Some("stop".into()),
        }],
        usage: None,
    }
}

#[async_trait]
impl ChatCompletion for FakeLlm {
    async fn complete(&self, request: &ChatCompletionRequest) -> CbResult<ChatCompletionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if request.response_format.is_some() {
            let summary = self.summary.lock().unwrap().to_string();
            return Ok(response(WireMessage::assistant(summary)));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .map(response)
            .ok_or_else(|| CbError::Llm("no scripted response".into()))
    }
}

// ---- Fake messenger ----

#[derive(Default)]
pub struct FakeMessenger {
    pub sms: Mutex<Vec<(String, String)>>,
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail_sms: Mutex<bool>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sms.lock().unwrap().clone()
    }

    pub fn placed_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_sms(&self, fail: bool) {
        *self.fail_sms.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_sms(&self, _creds: &ApiCredential, to: &str, body: &str) -> CbResult<String> {
        if *self.fail_sms.lock().unwrap() {
            return Err(CbError::ServerError {
                status: 400,
                message: "unreachable number".into(),
            });
        }
        let mut sms = self.sms.lock().unwrap();
        sms.push((to.to_string(), body.to_string()));
        Ok(format!("SM{}", sms.len()))
    }

    async fn place_call(&self, _creds: &ApiCredential, to: &str, message: &str) -> CbResult<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((to.to_string(), message.to_string()));
        Ok(format!("CA{}", calls.len()))
    }
}

// ---- Fake webhook ----

/// Records every payload it is handed.
#[derive(Default)]
pub struct FakeWebhook {
    pub payloads: Mutex<Vec<Value>>,
}

impl FakeWebhook {
    pub fn delivered(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }

    /// Wait for `n` deliveries; webhooks are posted from spawned tasks.
    pub async fn wait_for(&self, n: usize) -> Vec<Value> {
        for _ in 0..50 {
            if self.payloads.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.delivered()
    }
}

#[async_trait]
impl WebhookSink for FakeWebhook {
    async fn deliver(&self, payload: &Value) -> CbResult<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

// ---- Seeded environment ----

/// A database with one business, two cleaners and fake clients.
pub struct TestEnv {
    pub db: Database,
    pub ctx: ServiceContext,
    pub llm: Arc<FakeLlm>,
    pub messenger: Arc<FakeMessenger>,
    pub webhook: Arc<FakeWebhook>,
    pub business: Business,
    pub cleaners: Vec<Cleaner>,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        cb_core::logging::init_test_logging();
        let (db, dir) = create_test_db();
        let (business, cleaners) = seed_business(&db);
        let llm = Arc::new(FakeLlm::new());
        let messenger = Arc::new(FakeMessenger::default());
        let webhook = Arc::new(FakeWebhook::default());
        let ctx = ServiceContext::new(config, db.clone(), EventBus::new(64))
            .with_llm(llm.clone())
            .with_messenger(messenger.clone())
            .with_webhook(webhook.clone());
        Self {
            db,
            ctx,
            llm,
            messenger,
            webhook,
            business,
            cleaners,
            _dir: dir,
        }
    }

    pub fn business_id(&self) -> &str {
        &self.business.business_id
    }

    /// A second business with the same roster shape but no SMS credentials.
    pub fn business_without_sms(&self) -> Business {
        let conn = self.db.conn().unwrap();
        let mut business = Business::new("Quiet Cleaning");
        business.timezone = "America/Chicago".into();
        business.save(&conn).unwrap();
        let mut cleaner = Cleaner::new(business.id.unwrap(), "Cara");
        cleaner.save(&conn).unwrap();
        CleanerAvailability::new(cleaner.id.unwrap(), Weekday::Fri, hm(9, 0), hm(17, 0))
            .save(&conn)
            .unwrap();
        business
    }

    /// A complete summary for a standard clean: 3 bed, 2 bath, 1000 sq ft.
    /// Quotes to 154.00 with the seeded prices.
    pub fn summary(&self, when: &str) -> Value {
        json!({
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "jane@example.com",
            "phoneNumber": "(512) 555-0100",
            "address1": "1 Main St",
            "city": "Austin",
            "state": "TX",
            "zipCode": "78701",
            "serviceType": "regular cleaning",
            "appointmentDateTime": when,
            "bedrooms": "3",
            "bathrooms": "2",
            "squareFeet": "1000",
        })
    }
}

/// Seed a Chicago business with prices, SMS credentials and two cleaners
/// (Alice rated 5, Bob rated 4) working weekdays 09:00 to 17:00.
pub fn seed_business(db: &Database) -> (Business, Vec<Cleaner>) {
    let conn = db.conn().expect("failed to get connection for seeding");

    let mut business = Business::new("Sparkle Cleaning");
    business.timezone = "America/Chicago".into();
    business.phone = Some("+15125550199".into());
    business.save(&conn).unwrap();
    let bid = business.id.unwrap();

    let mut settings = business.settings(&conn).unwrap();
    settings.prices.bedroom_price = 20.0;
    settings.prices.bathroom_price = 15.0;
    settings.prices.sqft_multiplier_standard = 0.05;
    settings.prices.sqft_multiplier_deep = 0.1;
    settings.prices.tax_percent = 10.0;
    settings.save(&conn).unwrap();

    let mut creds = ApiCredential {
        business_id: bid,
        twilio_account_sid: Some("AC123".into()),
        twilio_auth_token: Some("token".into()),
        twilio_sms_number: Some("+15125550100".into()),
        ..ApiCredential::default()
    };
    creds.save(&conn).unwrap();

    let mut cleaners = Vec::new();
    for (name, rating) in [("Alice", 5), ("Bob", 4)] {
        let mut cleaner = Cleaner::new(bid, name);
        cleaner.rating = rating;
        cleaner.save(&conn).unwrap();
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            CleanerAvailability::new(cleaner.id.unwrap(), day, hm(9, 0), hm(17, 0))
                .save(&conn)
                .unwrap();
        }
        cleaners.push(cleaner);
    }

    (business, cleaners)
}
