//! Shared dependencies handed to every domain service.

use std::sync::Arc;

use cb_api::{ChatCompletion, Messenger, WebhookSink};
use cb_core::config::AppConfig;
use cb_core::error::{CbError, CbResult};
use cb_models::{Business, Database};

use crate::event_bus::EventBus;

/// Configuration snapshot, database, event bus and outbound clients.
///
/// Cheap to clone; services keep their own copy.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<AppConfig>,
    pub database: Database,
    pub event_bus: EventBus,
    pub llm: Option<Arc<dyn ChatCompletion>>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub webhook: Option<Arc<dyn WebhookSink>>,
}

impl ServiceContext {
    pub fn new(config: AppConfig, database: Database, event_bus: EventBus) -> Self {
        Self {
            config: Arc::new(config),
            database,
            event_bus,
            llm: None,
            messenger: None,
            webhook: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn ChatCompletion>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn with_webhook(mut self, webhook: Arc<dyn WebhookSink>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// The LLM client, or an error naming the missing setting.
    pub fn require_llm(&self) -> CbResult<Arc<dyn ChatCompletion>> {
        self.llm
            .clone()
            .ok_or_else(|| CbError::MissingConfig("llm.api_key (or OPENAI_API_KEY)".into()))
    }

    /// Look up a business by its public `BUS-nnnn` id.
    pub fn business(&self, business_id: &str) -> CbResult<Business> {
        let conn = self.database.conn()?;
        Business::find_by_business_id(&conn, business_id)?
            .ok_or_else(|| CbError::not_found("business", business_id))
    }

    /// Look up a business by its local row id.
    pub fn business_by_row(&self, id: i64) -> CbResult<Business> {
        let conn = self.database.conn()?;
        Business::find_by_id(&conn, id)?.ok_or_else(|| CbError::not_found("business", id.to_string()))
    }
}
