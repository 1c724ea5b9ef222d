//! API endpoint modules organized by remote service.
//!
//! Each module adds typed methods to [`crate::ApiClient`] and the trait that
//! services depend on.

pub mod completions;
pub mod messaging;
pub mod webhooks;
