//! Retrying HTTP client shared by every outbound integration.
//!
//! Handles authentication, default headers, timeout management, exponential
//! backoff retry, and status classification.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use cb_core::config::{LlmConfig, SmsConfig, WebhookConfig};
use cb_core::constants::{APP_NAME, APP_VERSION};
use cb_core::error::{CbError, CbResult};

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// How requests authenticate.
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// HTTP basic auth.
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    Json(&'a serde_json::Value),
    Form(&'a [(&'a str, &'a str)]),
}

/// HTTP client for one remote service.
///
/// Wraps reqwest::Client with a base URL, default authentication, header
/// injection, retry logic, and error handling.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Base URL that relative paths are appended to.
    base_url: String,
    /// Default authentication.
    auth: Auth,
    /// Default request timeout.
    timeout: Duration,
    /// Retry configuration.
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str, auth: Auth, timeout: Duration) -> CbResult<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .map_err(|e| CbError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            timeout,
            retry_config: RetryConfig::default(),
        })
    }

    /// Client for the chat-completions endpoint.
    pub fn for_llm(config: &LlmConfig) -> CbResult<Self> {
        let key = config
            .effective_api_key()
            .ok_or_else(|| CbError::MissingConfig("llm.api_key (or OPENAI_API_KEY)".into()))?;
        Self::new(&config.api_base, Auth::Bearer(key), Duration::from_millis(config.timeout_ms))
    }

    /// Client for the SMS/voice provider. Credentials are per business and
    /// supplied per request.
    pub fn for_sms(config: &SmsConfig) -> CbResult<Self> {
        Self::new(&config.api_base, Auth::None, Duration::from_millis(config.timeout_ms))
    }

    /// Client for outbound webhooks. Paths are absolute URLs.
    pub fn for_webhooks(config: &WebhookConfig) -> CbResult<Self> {
        Ok(Self::new("", Auth::None, Duration::from_millis(config.timeout_ms))?
            .with_retry_config(RetryConfig {
                max_retries: 1,
                ..RetryConfig::default()
            }))
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full URL for a path. Absolute URLs pass through unchanged.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Apply authentication to a request builder.
    fn apply_auth(&self, builder: RequestBuilder, auth: &Auth) -> RequestBuilder {
        match auth {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }

    /// Internal: build a request for the given method, URL and optional body.
    fn build_request(
        &self,
        method: Method,
        url: &str,
        auth: &Auth,
        body: Option<Body<'_>>,
        headers: &[(&str, &str)],
    ) -> RequestBuilder {
        let mut builder = self.inner.request(method, url).timeout(self.timeout);
        match body {
            Some(Body::Json(b)) => builder = builder.json(b),
            Some(Body::Form(f)) => builder = builder.form(f),
            None => {}
        }
        for (key, value) in headers {
            builder = builder.header(*key, *value);
        }
        self.apply_auth(builder, auth)
    }

    /// Execute a request with exponential backoff retry.
    pub async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        auth: Option<&Auth>,
        body: Option<Body<'_>>,
        headers: &[(&str, &str)],
    ) -> CbResult<Response> {
        let url = self.url(path);
        let auth = auth.unwrap_or(&self.auth);
        debug!("{} {}", method, url);

        let mut last_error: Option<CbError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    url,
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.build_request(method.clone(), &url, auth, body, headers);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), url);
                        last_error = Some(CbError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error on {}: {}", url, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CbError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    // --- Public HTTP methods ---

    /// Execute a POST request with a JSON body.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> CbResult<Response> {
        self.request_with_retry(Method::POST, path, None, Some(Body::Json(body)), &[])
            .await
    }

    /// Execute a form-encoded POST with explicit credentials.
    pub async fn post_form(
        &self,
        path: &str,
        auth: &Auth,
        form: &[(&str, &str)],
    ) -> CbResult<Response> {
        self.request_with_retry(Method::POST, path, Some(auth), Some(Body::Form(form)), &[])
            .await
    }

    // --- Response helpers ---

    /// Deserialize a response body.
    pub async fn parse_response<T: DeserializeOwned>(response: Response) -> CbResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| CbError::Serialization(format!("failed to parse response: {e}")))
    }

    /// Convenience: POST + parse.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> CbResult<T> {
        let resp = self.post(path, body).await?;
        Self::parse_response(resp).await
    }

    /// Check the HTTP status code and convert to CbError if needed.
    async fn check_status(response: Response) -> CbResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CbError::AuthFailed(format!("server returned {status}")));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CbError::ServerError {
                status: status.as_u16(),
                message: crate::response::extract_error_message(&body),
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into a CbError variant.
    fn classify_error(e: reqwest::Error) -> CbError {
        if e.is_timeout() {
            CbError::Timeout(e.to_string())
        } else if e.is_connect() {
            CbError::Http(format!("connection failed: {e}"))
        } else {
            CbError::Http(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new("https://api.example.com/v1/", Auth::None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = client();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
        assert_eq!(client.url("/chat/completions"), "https://api.example.com/v1/chat/completions");
        assert_eq!(client.url("https://hooks.example.com/x"), "https://hooks.example.com/x");
    }

    #[test]
    fn test_retry_delay_calculation() {
        let client = client();
        assert_eq!(client.calculate_retry_delay(0), Duration::from_secs(1));
        assert_eq!(client.calculate_retry_delay(1), Duration::from_secs(2));
        assert_eq!(client.calculate_retry_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_delay_capped() {
        let client = client();
        let d10 = client.calculate_retry_delay(10);
        assert!(d10 <= Duration::from_secs(4));
    }

    #[test]
    fn test_for_llm_requires_key() {
        let config = LlmConfig {
            api_key: "sk-test".into(),
            ..LlmConfig::default()
        };
        let client = ApiClient::for_llm(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
        assert!(matches!(client.auth, Auth::Bearer(ref k) if k == "sk-test"));
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let auth = Auth::Basic {
            username: "AC123".into(),
            password: "secret".into(),
        };
        let shown = format!("{auth:?}");
        assert!(shown.contains("AC123"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_webhook_client_retries_once() {
        let client = ApiClient::for_webhooks(&WebhookConfig::default()).unwrap();
        assert_eq!(client.retry_config.max_retries, 1);
    }
}
