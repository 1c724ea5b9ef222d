//! CleanBiz Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other CleanBiz crates:
//! - Application configuration (database, LLM, messaging, scheduling, reminders)
//! - Global error types covering all error categories
//! - Structured logging with tracing
//! - Data and config directories
//! - Public id generation, phone normalization, and money rounding

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod constants;
pub mod ids;
pub mod phone;
pub mod money;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{CbError, CbResult};
pub use logging::init_logging;
