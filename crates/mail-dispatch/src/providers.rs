//! Two injectable provider capabilities, modeled on a gateway-trait pattern
//! generalized from one capability to two: callers depend on `SmsProvider`
//! and `EmailProvider`, never on a concrete Twilio or SendGrid client.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rejected the message: {0}")]
    Rejected(String),
    #[error("provider transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsOutcome {
    pub status: String,
    /// A non-empty code here is a provider-reported failure even though the
    /// HTTP call itself succeeded.
    pub error_code: Option<String>,
}

impl SmsOutcome {
    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: &'static str,
    /// Base64-encoded payload bytes.
    pub base64_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPayload {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailOutcome {
    pub status_code: u16,
}

impl EmailOutcome {
    pub fn is_success(&self) -> bool {
        (200..=204).contains(&self.status_code)
    }
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsOutcome, ProviderError>;
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_email(&self, payload: EmailPayload) -> Result<EmailOutcome, ProviderError>;
}

// Constructed once in `main` and shared via `Arc` across the batch's
// concurrent per-row dispatch tasks. These blanket impls let an
// `Arc<impl SmsProvider>` stand in for the trait directly, and let tests
// hold a handle to a fake's recorded calls after moving a clone into the
// dispatcher.
#[async_trait]
impl<T: SmsProvider + ?Sized> SmsProvider for std::sync::Arc<T> {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsOutcome, ProviderError> {
        (**self).send_sms(to, from, body).await
    }
}

#[async_trait]
impl<T: EmailProvider + ?Sized> EmailProvider for std::sync::Arc<T> {
    async fn send_email(&self, payload: EmailPayload) -> Result<EmailOutcome, ProviderError> {
        (**self).send_email(payload).await
    }
}
