//! Twilio-shaped SMS provider adapter.
//!
//! Implements `mail_dispatch::SmsProvider` over Twilio's REST API
//! (`POST /2010-04-01/Accounts/{AccountSid}/Messages.json`), authenticated
//! with an API key SID/secret pair rather than the account's auth token —
//! the same credential shape `acs_messenger.py` passes to
//! `twilio.rest.Client(api_key_sid, api_key_secret, account_sid)`.

use async_trait::async_trait;
use mail_dispatch::{ProviderError, SmsOutcome, SmsProvider};
use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsProvider {
    client: reqwest::Client,
    account_sid: String,
    api_key_sid: String,
    api_key_secret: String,
    base_url: String,
}

impl TwilioSmsProvider {
    pub fn new(client: reqwest::Client, account_sid: String, api_key_sid: String, api_key_secret: String) -> Self {
        TwilioSmsProvider {
            client,
            account_sid,
            api_key_sid,
            api_key_secret,
            base_url: TWILIO_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    status: String,
    error_code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: String,
}

#[async_trait]
impl SmsProvider for TwilioSmsProvider {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsOutcome, ProviderError> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key_sid, Some(&self.api_key_secret))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Result<TwilioErrorBody, _> = response.json().await;
            let reason = body.map(|b| b.message).unwrap_or_else(|_| status.to_string());
            return Err(ProviderError::Rejected(format!(
                "twilio http {status}: {reason}"
            )));
        }

        let parsed: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        tracing::debug!(status = %parsed.status, "twilio message accepted");

        Ok(SmsOutcome {
            status: parsed.status,
            error_code: parsed.error_code.map(|code| {
                parsed
                    .message
                    .map(|m| format!("{code} {m}"))
                    .unwrap_or_else(|| code.to_string())
            }),
        })
    }
}
