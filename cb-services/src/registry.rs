//! Service registry for dependency injection and lifecycle management.
//!
//! The registry builds the shared context (database, event bus, outbound
//! clients), holds every domain service, initializes them in order and
//! shuts them down in reverse.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use cb_api::{ApiClient, ChatCompletion, HttpWebhookSink, Messenger, TwilioMessenger, WebhookSink};
use cb_core::config::{AppConfig, ConfigHandle};
use cb_core::error::{CbError, CbResult};
use cb_models::Database;

use crate::agent::AgentService;
use crate::automation::AutomationListener;
use crate::availability::AvailabilityService;
use crate::booking::BookingService;
use crate::context::ServiceContext;
use crate::coupon::CouponService;
use crate::event_bus::EventBus;
use crate::invoice::InvoiceService;
use crate::lead::LeadService;
use crate::notification::NotificationService;
use crate::reminder::ReminderService;
use crate::service::{Service, ServiceHealth};

/// Attach the outbound clients the configuration enables.
///
/// The LLM client needs an API key; without one the agent runs degraded.
/// The messenger is always attached because credentials live per business.
pub fn build_context(config: AppConfig, database: Database, event_bus: EventBus) -> CbResult<ServiceContext> {
    let llm: Option<Arc<dyn ChatCompletion>> = if config.is_llm_configured() {
        Some(Arc::new(ApiClient::for_llm(&config.llm)?))
    } else {
        warn!("no LLM api key configured; the agent is disabled");
        None
    };
    let messenger: Arc<dyn Messenger> = Arc::new(TwilioMessenger::from_config(&config.sms)?);
    let webhook: Option<Arc<dyn WebhookSink>> =
        HttpWebhookSink::from_config(&config.webhooks)?.map(|s| Arc::new(s) as Arc<dyn WebhookSink>);

    let mut ctx = ServiceContext::new(config, database, event_bus).with_messenger(messenger);
    if let Some(llm) = llm {
        ctx = ctx.with_llm(llm);
    }
    if let Some(webhook) = webhook {
        ctx = ctx.with_webhook(webhook);
    }
    Ok(ctx)
}

/// Central registry of the application's services.
pub struct ServiceRegistry {
    /// Application configuration.
    pub config: ConfigHandle,
    /// Shared dependencies handed to each service.
    pub ctx: ServiceContext,
    /// Registered services in initialization order.
    services: Vec<(String, Arc<RwLock<Box<dyn Service>>>)>,
}

impl ServiceRegistry {
    pub fn new(config: ConfigHandle, ctx: ServiceContext) -> Self {
        Self {
            config,
            ctx,
            services: Vec::new(),
        }
    }

    /// Open the database and build every client from the configuration.
    pub async fn from_config(config: ConfigHandle) -> CbResult<Self> {
        let snapshot = config.snapshot().await;
        let db_path = snapshot.effective_db_path()?;
        let database = Database::init(&db_path, &snapshot.database)?;
        let ctx = build_context(snapshot, database, EventBus::default())?;
        Ok(Self::new(config, ctx))
    }

    /// Register a service. Services are initialized in registration order.
    pub fn register<S: Service + 'static>(&mut self, service: S) {
        let name = service.name().to_string();
        info!("registered service: {name}");
        self.services
            .push((name, Arc::new(RwLock::new(Box::new(service)))));
    }

    /// Register all default services in dependency order:
    /// notifications first, then the domain services that record data, then
    /// the agent, the reminder sweeps and the automation listener.
    pub fn register_all(&mut self) {
        let ctx = self.ctx.clone();

        self.register(NotificationService::new(ctx.clone()));
        self.register(AvailabilityService::new(ctx.clone()));
        self.register(CouponService::new(ctx.clone()));
        self.register(BookingService::new(ctx.clone()));
        self.register(InvoiceService::new(ctx.clone()));
        self.register(LeadService::new(ctx.clone()));
        self.register(AgentService::new(ctx.clone()));
        self.register(ReminderService::new(ctx.clone()));
        self.register(AutomationListener::new(ctx));

        info!("registered {} default services", self.services.len());
    }

    /// Initialize all registered services in order.
    pub async fn init_all(&self) -> CbResult<()> {
        info!("initializing {} services", self.services.len());

        for (name, service) in &self.services {
            let mut svc = service.write().await;
            if let Err(e) = svc.init() {
                error!("failed to initialize service {name}: {e}");
                return Err(CbError::ServiceInit(format!("{name}: {e}")));
            }
            info!("service {name}: {}", svc.state());
        }

        info!("all services initialized");
        Ok(())
    }

    /// Shut down all services in reverse order.
    pub async fn shutdown_all(&self) -> CbResult<()> {
        info!("shutting down services");

        for (name, service) in self.services.iter().rev() {
            let mut svc = service.write().await;
            if let Err(e) = svc.shutdown() {
                error!("error shutting down service {name}: {e}");
            }
        }

        info!("all services shut down");
        Ok(())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.event_bus
    }

    pub fn database(&self) -> &Database {
        &self.ctx.database
    }

    /// Health of every service, in registration order.
    pub async fn health_check(&self) -> Vec<ServiceHealth> {
        let mut results = Vec::with_capacity(self.services.len());
        for (_, service) in &self.services {
            results.push(service.read().await.health());
        }
        results
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}
