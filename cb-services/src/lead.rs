//! Lead capture and conversion.

use chrono::{DateTime, Utc};
use tracing::info;

use cb_core::error::{CbError, CbResult};
use cb_core::phone::normalize_or_keep;
use cb_models::queries;
use cb_models::{Business, Lead};

use crate::context::ServiceContext;
use crate::event_bus::AppEvent;
use crate::service::{Service, ServiceState};

/// Contact details of a new lead.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub notes: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Stores leads. Outreach runs off the `LeadCreated` event.
pub struct LeadService {
    state: ServiceState,
    ctx: ServiceContext,
}

impl LeadService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            state: ServiceState::Created,
            ctx,
        }
    }

    pub fn create_lead(&self, business: &Business, lead: NewLead) -> CbResult<Lead> {
        self.create_lead_at(business, lead, Utc::now())
    }

    pub fn create_lead_at(&self, business: &Business, new: NewLead, now: DateTime<Utc>) -> CbResult<Lead> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(CbError::Validation("Lead name is required".into()));
        }
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;

        let mut lead = Lead::new(business_id, name);
        lead.email = non_blank(new.email);
        lead.phone_number = non_blank(new.phone_number).map(|p| normalize_or_keep(&p));
        lead.notes = non_blank(new.notes);
        lead.content = non_blank(new.content);
        lead.source = non_blank(new.source);
        lead.created_at = now;

        let conn = self.ctx.database.conn()?;
        lead.save(&conn)?;
        info!("lead {} captured for {}", lead.lead_id, business.business_id);

        self.ctx.event_bus.emit(AppEvent::LeadCreated {
            business_id,
            lead_id: lead.lead_id.clone(),
        });
        Ok(lead)
    }

    pub fn get(&self, lead_id: &str) -> CbResult<Lead> {
        let conn = self.ctx.database.conn()?;
        Lead::find_by_lead_id(&conn, lead_id)?.ok_or_else(|| CbError::not_found("lead", lead_id))
    }

    /// Mark a lead as converted into a customer.
    pub fn convert_lead(&self, lead_id: &str) -> CbResult<Lead> {
        let conn = self.ctx.database.conn()?;
        let mut lead = Lead::find_by_lead_id(&conn, lead_id)?
            .ok_or_else(|| CbError::not_found("lead", lead_id))?;
        if !lead.is_converted {
            lead.is_converted = true;
            lead.save(&conn)?;
            info!("lead {} converted", lead.lead_id);
        }
        Ok(lead)
    }

    pub fn list_leads(&self, business: &Business, include_converted: bool, limit: i64) -> CbResult<Vec<Lead>> {
        let conn = self.ctx.database.conn()?;
        queries::list_leads(&conn, business.id.unwrap_or_default(), include_converted, limit)
    }
}

impl Service for LeadService {
    fn name(&self) -> &str {
        "leads"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn init(&mut self) -> CbResult<()> {
        self.state = ServiceState::Running;
        Ok(())
    }

    fn shutdown(&mut self) -> CbResult<()> {
        self.state = ServiceState::Stopped;
        Ok(())
    }
}
