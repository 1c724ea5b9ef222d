//! CleanBiz API - HTTP clients for the services CleanBiz talks to.
//!
//! One retrying [`ApiClient`] is configured three ways: an OpenAI-compatible
//! chat-completions endpoint for the booking agent, a Twilio-compatible REST
//! API for SMS and voice calls, and plain JSON webhooks for new bookings.
//! Each use is exposed through an async trait so services can be tested with
//! scripted fakes.

pub mod client;
pub mod endpoints;
pub mod response;

// Re-export key types
pub use client::{ApiClient, Auth, Body, RetryConfig};
pub use endpoints::completions::{ChatCompletion, ChatCompletionRequest, ResponseFormat, ToolSpec};
pub use endpoints::messaging::{say_twiml, Messenger, TwilioMessenger};
pub use endpoints::webhooks::{HttpWebhookSink, WebhookSink};
pub use response::{ChatCompletionResponse, FunctionCall, ProviderResource, ToolCall, WireMessage};
