//! Outbound JSON webhooks.

use async_trait::async_trait;
use reqwest::Method;
use tracing::info;
use uuid::Uuid;

use cb_core::config::WebhookConfig;
use cb_core::error::CbResult;

use crate::client::{ApiClient, Body};

/// Receiver of booking event payloads.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, payload: &serde_json::Value) -> CbResult<()>;
}

pub struct HttpWebhookSink {
    client: ApiClient,
    url: String,
}

impl HttpWebhookSink {
    pub fn new(client: ApiClient, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    /// `None` when no webhook URL is configured.
    pub fn from_config(config: &WebhookConfig) -> CbResult<Option<Self>> {
        if config.booking_url.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(
            ApiClient::for_webhooks(config)?,
            config.booking_url.trim(),
        )))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, payload: &serde_json::Value) -> CbResult<()> {
        let key = Uuid::new_v4().to_string();
        let resp = self
            .client
            .request_with_retry(
                Method::POST,
                &self.url,
                None,
                Some(Body::Json(payload)),
                &[("X-Idempotency-Key", key.as_str())],
            )
            .await?;
        info!(url = %self.url, status = resp.status().as_u16(), "webhook delivered");
        Ok(())
    }
}
