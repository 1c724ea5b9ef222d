//! SMS and voice-call delivery through a Twilio-compatible REST API.

use async_trait::async_trait;
use tracing::{debug, info};

use cb_core::config::SmsConfig;
use cb_core::error::{CbError, CbResult};
use cb_models::ApiCredential;

use crate::client::{ApiClient, Auth};
use crate::response::ProviderResource;

/// Outbound text and voice channel. Credentials belong to the business
/// sending the message.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send an SMS; returns the provider's message id.
    async fn send_sms(&self, creds: &ApiCredential, to: &str, body: &str) -> CbResult<String>;

    /// Place a call that reads `message` aloud; returns the call id.
    async fn place_call(&self, creds: &ApiCredential, to: &str, message: &str) -> CbResult<String>;
}

pub struct TwilioMessenger {
    client: ApiClient,
    twiml_url: Option<String>,
}

impl TwilioMessenger {
    pub fn new(client: ApiClient, twiml_url: Option<String>) -> Self {
        Self { client, twiml_url }
    }

    pub fn from_config(config: &SmsConfig) -> CbResult<Self> {
        let twiml_url = Some(config.call_twiml_url.clone()).filter(|u| !u.is_empty());
        Ok(Self::new(ApiClient::for_sms(config)?, twiml_url))
    }

    fn credentials(creds: &ApiCredential) -> CbResult<(Auth, String, String)> {
        let sid = creds
            .twilio_account_sid
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CbError::MissingConfig("twilio account sid".into()))?;
        let token = creds
            .twilio_auth_token
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CbError::MissingConfig("twilio auth token".into()))?;
        let from = creds
            .twilio_sms_number
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CbError::MissingConfig("twilio phone number".into()))?;
        Ok((
            Auth::Basic {
                username: sid.clone(),
                password: token,
            },
            sid,
            from,
        ))
    }
}

/// Inline TwiML that speaks `message`.
pub fn say_twiml(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!("<Response><Say>{escaped}</Say></Response>")
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send_sms(&self, creds: &ApiCredential, to: &str, body: &str) -> CbResult<String> {
        let (auth, sid, from) = Self::credentials(creds)?;
        let path = format!("/Accounts/{sid}/Messages.json");
        debug!(to, "sending sms");
        let resp = self
            .client
            .post_form(&path, &auth, &[("To", to), ("From", from.as_str()), ("Body", body)])
            .await
            .map_err(|e| CbError::Notification(format!("sms to {to} failed: {e}")))?;
        let res: ProviderResource = ApiClient::parse_response(resp).await?;
        info!(to, sid = %res.sid, "sms queued");
        Ok(res.sid)
    }

    async fn place_call(&self, creds: &ApiCredential, to: &str, message: &str) -> CbResult<String> {
        let (auth, sid, from) = Self::credentials(creds)?;
        let path = format!("/Accounts/{sid}/Calls.json");
        let twiml = say_twiml(message);
        let mut form: Vec<(&str, &str)> = vec![("To", to), ("From", from.as_str())];
        match &self.twiml_url {
            Some(url) => form.push(("Url", url.as_str())),
            None => form.push(("Twiml", twiml.as_str())),
        }
        let resp = self
            .client
            .post_form(&path, &auth, &form)
            .await
            .map_err(|e| CbError::Notification(format!("call to {to} failed: {e}")))?;
        let res: ProviderResource = ApiClient::parse_response(resp).await?;
        info!(to, sid = %res.sid, "call placed");
        Ok(res.sid)
    }
}
