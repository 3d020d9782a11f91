//! Dispatcher: the single choke-point through which every claimed row's
//! provider call flows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use mail_db::ClaimedMessage;

use crate::classify::{classify, email_re, Classification};
use crate::providers::{EmailAttachment, EmailOutcome, EmailPayload, EmailProvider, SmsOutcome, SmsProvider};

/// A destination override resolved once at startup by the CLI. The
/// `"twilio"` magic value has already been resolved to the provider's test
/// number by the time it reaches the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Configured SMS sender number.
    pub sms_from: String,
    /// Configured email sender address, used when the row's `SourceAddress`
    /// is absent.
    pub email_from: String,
    pub overrides: Overrides,
    /// `--no-notify`: skip the provider call entirely, report success.
    pub no_notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Classification failed; archive to `FailedMail` immediately, no
    /// provider call was made, and the attempt budget is irrelevant.
    Invalid,
    /// A provider was (or would have been, under `--no-notify`) invoked;
    /// `success` determines whether the caller archives to `MailArchive`
    /// or leaves the row for retry / archives to `FailedMail` at the
    /// attempt cap.
    Dispatched { success: bool },
}

#[derive(Clone)]
pub struct Dispatcher<S: SmsProvider, E: EmailProvider> {
    sms: S,
    email: E,
    config: DispatchConfig,
}

impl<S: SmsProvider, E: EmailProvider> Dispatcher<S, E> {
    pub fn new(sms: S, email: E, config: DispatchConfig) -> Self {
        Dispatcher { sms, email, config }
    }

    pub async fn dispatch(&self, claimed: &ClaimedMessage) -> DispatchOutcome {
        let classification = match classify(&claimed.destination_address) {
            Ok(c) => c,
            Err(invalid) => {
                tracing::debug!(id = claimed.id, %invalid, "invalid destination, archiving as failed");
                return DispatchOutcome::Invalid;
            }
        };

        let success = match classification {
            Classification::Sms { target, domain } => self.dispatch_sms(claimed, target, domain).await,
            Classification::Email => self.dispatch_email(claimed).await,
        };

        DispatchOutcome::Dispatched { success }
    }

    async fn dispatch_sms(&self, claimed: &ClaimedMessage, target: String, domain: Option<String>) -> bool {
        let (to, domain) = match self.config.overrides.phone.clone() {
            Some(overridden) => {
                let mut parts = overridden.splitn(2, '@');
                let local = parts.next().unwrap_or("").to_string();
                let domain = parts.next().map(str::to_string);
                (local, domain)
            }
            None => (target, domain),
        };
        let to = strip_non_digits(&to);

        let subject = claimed.subject.trim();
        let body = claimed.body.trim();
        let msg = if domain.as_deref() == Some("txt.att.net") {
            format!("SUBJ:{subject}\nMSG:{body}")
        } else {
            body.to_string()
        };

        if self.config.no_notify {
            tracing::debug!(%to, "notifications disabled, skipping SMS send");
            return true;
        }

        match self.sms.send_sms(&to, &self.config.sms_from, &msg).await {
            Ok(outcome) => {
                tracing::debug!(%to, status = %outcome.status, "sms send completed");
                outcome.is_success()
            }
            Err(err) => {
                tracing::warn!(%to, %err, "sms send failed");
                false
            }
        }
    }

    async fn dispatch_email(&self, claimed: &ClaimedMessage) -> bool {
        let recipient = self
            .config
            .overrides
            .email
            .clone()
            .unwrap_or_else(|| claimed.destination_address.clone());

        let from = claimed
            .source_address
            .clone()
            .unwrap_or_else(|| self.config.email_from.clone());

        let cc = split_and_validate(claimed.cc_address.as_deref());
        let bcc = split_and_validate(claimed.bcc_address.as_deref());
        let attachment = build_attachment(claimed);

        let payload = EmailPayload {
            from,
            to: recipient,
            cc,
            bcc,
            subject: claimed.subject.clone(),
            body: claimed.body.clone(),
            attachment,
        };

        if self.config.no_notify {
            tracing::debug!(to = %payload.to, "notifications disabled, skipping email send");
            return true;
        }

        match self.email.send_email(payload.clone()).await {
            Ok(outcome) => {
                tracing::debug!(to = %payload.to, status = outcome.status_code, "email send completed");
                outcome.is_success()
            }
            Err(err) => {
                tracing::warn!(to = %payload.to, %err, "email send failed");
                false
            }
        }
    }
}

/// Strip a leading `+` and any non-digit punctuation from an SMS target,
/// matching `re.sub(r"[\(\)\s\-\+]+","",destination[0])`.
fn strip_non_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Split a comma-separated CC/BCC list, trim each entry, and drop anything
/// that doesn't match the email regex.
fn split_and_validate(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else { return Vec::new() };
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            if email_re().is_match(entry) {
                Some(entry.to_string())
            } else {
                tracing::error!(entry, "ignoring malformed cc/bcc recipient");
                None
            }
        })
        .collect()
}

/// Build the CSV attachment, named `{subject_slug}_YYYY_MM_DD_HH_MM_SS.csv`,
/// when the row carries a non-empty `Attachment`.
fn build_attachment(claimed: &ClaimedMessage) -> Option<EmailAttachment> {
    let bytes = claimed.attachment.as_ref().filter(|b| !b.is_empty())?;

    let basename = slugify(&claimed.subject);
    let timestamp = Utc::now().format("_%Y_%m_%d_%H_%M_%S");
    let filename = format!("{basename}{timestamp}.csv");

    Some(EmailAttachment {
        filename,
        content_type: "text/csv",
        base64_content: BASE64.encode(bytes),
    })
}

/// `re.sub(r'[^\w\-_.]', '_', subject.strip().lower())`.
fn slugify(subject: &str) -> String {
    subject
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_replaces_non_word_characters() {
        assert_eq!(slugify("Daily Report!"), "daily_report_");
    }

    #[test]
    fn split_and_validate_drops_malformed_entries() {
        let out = split_and_validate(Some(" ok@example.com , not-an-email , also@ok.com"));
        assert_eq!(out, vec!["ok@example.com".to_string(), "also@ok.com".to_string()]);
    }

    #[test]
    fn split_and_validate_handles_absent_list() {
        assert!(split_and_validate(None).is_empty());
    }

    #[test]
    fn strip_non_digits_removes_plus_and_punctuation() {
        assert_eq!(strip_non_digits("+1 (555) 123-4567"), "15551234567");
    }
}
