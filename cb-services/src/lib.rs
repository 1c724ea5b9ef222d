//! CleanBiz Services - Business logic and service layer.
//!
//! This crate provides the service trait, the service registry and the
//! domain services of a cleaning business:
//! - Pricing (bedrooms, bathrooms, square footage, add-ons, tax)
//! - Date parsing of customer-written appointment times
//! - Cleaner availability and alternate slots
//! - Bookings (create, reschedule, cancel, complete)
//! - Invoices, payments and tips
//! - Coupons
//! - Leads
//! - Customer notifications over SMS with call fallback
//! - Reminder and release sweeps
//! - The conversational booking agent
//! - Event bus and the automation listener reacting to it

pub mod service;
pub mod registry;
pub mod context;
pub mod event_bus;
pub mod pricing;
pub mod datetime;
pub mod availability;
pub mod coupon;
pub mod booking;
pub mod invoice;
pub mod lead;
pub mod notification;
pub mod reminder;
pub mod automation;
pub mod agent;

// Re-export key types
pub use service::{Service, ServiceHealth, ServiceState};
pub use registry::{build_context, ServiceRegistry};
pub use context::ServiceContext;
pub use event_bus::{AppEvent, EventBus};
pub use availability::AvailabilityService;
pub use coupon::CouponService;
pub use booking::{BookingRequest, BookingService, CreatedBooking, RescheduleOutcome};
pub use invoice::InvoiceService;
pub use lead::{LeadService, NewLead};
pub use notification::{Delivery, NotificationService};
pub use reminder::{ReminderService, SweepReport};
pub use automation::AutomationListener;
pub use agent::{AgentReply, AgentService};
