//! Fake provider implementations: deterministic, no network I/O, every call
//! recorded for assertion.

use std::sync::Mutex;

use async_trait::async_trait;
use mail_dispatch::{EmailOutcome, EmailPayload, EmailProvider, ProviderError, SmsOutcome, SmsProvider};

/// Records every `send_sms` call and returns a scripted outcome (or error).
pub struct RecordingSmsProvider {
    pub calls: Mutex<Vec<SmsCall>>,
    outcome: Mutex<Result<SmsOutcome, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsCall {
    pub to: String,
    pub from: String,
    pub body: String,
}

impl RecordingSmsProvider {
    pub fn always_succeeds() -> Self {
        RecordingSmsProvider {
            calls: Mutex::new(Vec::new()),
            outcome: Mutex::new(Ok(SmsOutcome {
                status: "queued".to_string(),
                error_code: None,
            })),
        }
    }

    pub fn scripted(outcome: Result<SmsOutcome, String>) -> Self {
        RecordingSmsProvider {
            calls: Mutex::new(Vec::new()),
            outcome: Mutex::new(outcome),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SmsProvider for RecordingSmsProvider {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsOutcome, ProviderError> {
        self.calls.lock().unwrap().push(SmsCall {
            to: to.to_string(),
            from: from.to_string(),
            body: body.to_string(),
        });
        self.outcome
            .lock()
            .unwrap()
            .clone()
            .map_err(ProviderError::Rejected)
    }
}

/// Records every `send_email` call and returns a scripted outcome (or error).
pub struct RecordingEmailProvider {
    pub calls: Mutex<Vec<EmailPayload>>,
    outcome: Mutex<Result<EmailOutcome, String>>,
}

impl RecordingEmailProvider {
    pub fn always_succeeds() -> Self {
        RecordingEmailProvider {
            calls: Mutex::new(Vec::new()),
            outcome: Mutex::new(Ok(EmailOutcome { status_code: 202 })),
        }
    }

    pub fn scripted(outcome: Result<EmailOutcome, String>) -> Self {
        RecordingEmailProvider {
            calls: Mutex::new(Vec::new()),
            outcome: Mutex::new(outcome),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailProvider for RecordingEmailProvider {
    async fn send_email(&self, payload: EmailPayload) -> Result<EmailOutcome, ProviderError> {
        self.calls.lock().unwrap().push(payload);
        self.outcome
            .lock()
            .unwrap()
            .clone()
            .map_err(ProviderError::Rejected)
    }
}
