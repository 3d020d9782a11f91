//! SendGrid-shaped email provider adapter.
//!
//! Implements `mail_dispatch::EmailProvider` over SendGrid's `v3/mail/send`
//! endpoint, building the same personalization/attachment JSON shape
//! `acs_messenger.py` assembles via `sendgrid.helpers.mail.Mail`.

use async_trait::async_trait;
use mail_dispatch::{EmailOutcome, EmailPayload, EmailProvider, ProviderError};
use serde::Serialize;
use serde_json::json;

const SENDGRID_API_BASE: &str = "https://api.sendgrid.com/v3";

pub struct SendGridEmailProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SendGridEmailProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        SendGridEmailProvider {
            client,
            api_key,
            base_url: SENDGRID_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<EmailAddress>,
}

#[derive(Serialize)]
struct EmailAddress {
    email: String,
}

fn addresses(emails: &[String]) -> Vec<EmailAddress> {
    emails
        .iter()
        .map(|e| EmailAddress { email: e.clone() })
        .collect()
}

fn build_request_body(payload: &EmailPayload) -> serde_json::Value {
    let personalization = Personalization {
        to: vec![EmailAddress {
            email: payload.to.clone(),
        }],
        cc: addresses(&payload.cc),
        bcc: addresses(&payload.bcc),
    };

    let mut body = json!({
        "personalizations": [personalization],
        "from": { "email": payload.from },
        "subject": payload.subject,
        "content": [{ "type": "text/plain", "value": payload.body }],
    });

    if let Some(attachment) = &payload.attachment {
        body["attachments"] = json!([{
            "content": attachment.base64_content,
            "filename": attachment.filename,
            "type": attachment.content_type,
            "disposition": "attachment",
        }]);
    }

    body
}

#[async_trait]
impl EmailProvider for SendGridEmailProvider {
    async fn send_email(&self, payload: EmailPayload) -> Result<EmailOutcome, ProviderError> {
        let url = format!("{}/mail/send", self.base_url);
        let body = build_request_body(&payload);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        let status_code = response.status().as_u16();
        if !(200..=204).contains(&status_code) {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status_code, body = %text, "sendgrid rejected the message");
            return Err(ProviderError::Rejected(format!(
                "sendgrid http {status_code}"
            )));
        }

        Ok(EmailOutcome { status_code })
    }
}
