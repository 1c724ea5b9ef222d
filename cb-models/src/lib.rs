//! CleanBiz Models - Database schema, models, migrations, and query builders.
//!
//! This crate owns all data persistence: SQLite database initialization,
//! the multi-tenant entity models (businesses, cleaners, bookings, invoices,
//! chats), versioned migrations, and list/report queries.

pub mod db;
pub mod schema;
pub mod models;
pub mod queries;
pub mod migrations;

// Re-export key types
pub use db::{Database, DatabaseStats};
pub use models::addon::{Addon, AddonTable};
pub use models::business::{
    AgentConfiguration, ApiCredential, Business, BusinessSettings, CustomAddon, CustomerPricing,
    PriceField, PriceOverrides, PriceSheet,
};
pub use models::customer::Customer;
pub use models::lead::Lead;
pub use models::cleaner::{Cleaner, CleanerAvailability};
pub use models::booking::{Booking, BookingCustomAddon};
pub use models::invoice::{Invoice, Payment};
pub use models::coupon::Coupon;
pub use models::chat::{Chat, ChatMessage};
pub use models::notification::NotificationTracker;
