//! Scenario coverage for classification and provider dispatch, exercised
//! against the dispatcher with local fake providers (no database needed at
//! this layer).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use mail_db::{ClaimedMessage, QueuedMessage};
use mail_dispatch::{
    DispatchConfig, DispatchOutcome, Dispatcher, EmailOutcome, EmailPayload, EmailProvider,
    Overrides, ProviderError, SmsOutcome, SmsProvider,
};

#[derive(Default)]
struct RecordingSms {
    calls: Mutex<Vec<(String, String, String)>>,
    outcome: Mutex<Option<SmsOutcome>>,
}

impl RecordingSms {
    fn with_outcome(outcome: SmsOutcome) -> Self {
        RecordingSms {
            calls: Mutex::new(vec![]),
            outcome: Mutex::new(Some(outcome)),
        }
    }
}

#[async_trait]
impl SmsProvider for RecordingSms {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<SmsOutcome, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((to.to_string(), from.to_string(), body.to_string()));
        Ok(self.outcome.lock().unwrap().clone().unwrap())
    }
}

#[derive(Default)]
struct RecordingEmail {
    calls: Mutex<Vec<EmailPayload>>,
    outcome: Mutex<Option<EmailOutcome>>,
}

impl RecordingEmail {
    fn with_outcome(outcome: EmailOutcome) -> Self {
        RecordingEmail {
            calls: Mutex::new(vec![]),
            outcome: Mutex::new(Some(outcome)),
        }
    }
}

#[async_trait]
impl EmailProvider for RecordingEmail {
    async fn send_email(&self, payload: EmailPayload) -> Result<EmailOutcome, ProviderError> {
        self.calls.lock().unwrap().push(payload);
        Ok(self.outcome.lock().unwrap().clone().unwrap())
    }
}

fn row(id: i64, destination: &str, subject: &str, body: &str, attachment: Option<Vec<u8>>) -> ClaimedMessage {
    ClaimedMessage {
        message: QueuedMessage {
            id,
            destination_address: destination.to_string(),
            source_address: None,
            cc_address: None,
            bcc_address: None,
            subject: subject.to_string(),
            body: body.to_string(),
            attachment,
            attempts: 1,
            processed_by: Some("host".to_string()),
            created_at: Utc::now(),
        },
    }
}

fn config() -> DispatchConfig {
    DispatchConfig {
        sms_from: "+18005550100".to_string(),
        email_from: "sender@example.com".to_string(),
        overrides: Overrides::default(),
        no_notify: false,
    }
}

fn ok_sms_outcome() -> SmsOutcome {
    SmsOutcome { status: "queued".into(), error_code: None }
}

fn ok_email_outcome() -> EmailOutcome {
    EmailOutcome { status_code: 202 }
}

#[tokio::test]
async fn s1_plain_email_dispatches_once_with_2xx() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), config());

    let outcome = dispatcher.dispatch(&row(1, "alice@example.com", "Hi", "hello", None)).await;

    assert_eq!(outcome, DispatchOutcome::Dispatched { success: true });
    assert_eq!(email.calls.lock().unwrap().len(), 1);
    assert_eq!(sms.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn s2_bare_phone_number_dispatches_sms_verbatim() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), config());

    let outcome = dispatcher.dispatch(&row(2, "5551234567", "x", "ping", None)).await;

    assert_eq!(outcome, DispatchOutcome::Dispatched { success: true });
    let calls = sms.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "5551234567");
    assert_eq!(calls[0].2, "ping");
}

#[tokio::test]
async fn s3_txt_att_net_gateway_address_gets_framing_header() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), config());

    let outcome = dispatcher
        .dispatch(&row(3, "5551234567@txt.att.net", "ALERT", "door open", None))
        .await;

    assert_eq!(outcome, DispatchOutcome::Dispatched { success: true });
    let calls = sms.calls.lock().unwrap();
    assert_eq!(calls[0].2, "SUBJ:ALERT\nMSG:door open");
}

#[tokio::test]
async fn s4_malformed_address_is_invalid_without_a_provider_call() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), config());

    let outcome = dispatcher.dispatch(&row(4, "bogus", "x", "x", None)).await;

    assert_eq!(outcome, DispatchOutcome::Invalid);
    assert_eq!(sms.calls.lock().unwrap().len(), 0);
    assert_eq!(email.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn twilio_override_resolves_to_magic_test_number() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let mut cfg = config();
    cfg.overrides.phone = Some(mail_dispatch::TWILIO_MAGIC_TEST_NUMBER.to_string());
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), cfg);

    dispatcher.dispatch(&row(5, "5551234567", "x", "ping", None)).await;

    let calls = sms.calls.lock().unwrap();
    assert_eq!(calls[0].0, "15005550006");
}

#[tokio::test]
async fn email_with_attachment_gets_csv_filename_and_base64_body() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms, email.clone(), config());

    dispatcher
        .dispatch(&row(6, "bob@example.com", "Daily Report", "body", Some(b"a,b\n1,2\n".to_vec())))
        .await;

    let calls = email.calls.lock().unwrap();
    let attachment = calls[0].attachment.as_ref().expect("attachment present");
    assert!(attachment.filename.starts_with("daily_report_"));
    assert!(attachment.filename.ends_with(".csv"));
    assert_eq!(attachment.content_type, "text/csv");
}

#[tokio::test]
async fn email_drops_malformed_cc_bcc_entries() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms, email.clone(), config());

    let mut r = row(7, "bob@example.com", "x", "x", None);
    r.message.cc_address = Some(" ok@example.com , not-an-email ".to_string());

    dispatcher.dispatch(&r).await;

    let calls = email.calls.lock().unwrap();
    assert_eq!(calls[0].cc, vec!["ok@example.com".to_string()]);
}

#[tokio::test]
async fn provider_error_code_is_treated_as_failure() {
    let sms = Arc::new(RecordingSms::with_outcome(SmsOutcome {
        status: "failed".into(),
        error_code: Some("30008".into()),
    }));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let dispatcher = Dispatcher::new(sms, email, config());

    let outcome = dispatcher.dispatch(&row(8, "5551234567", "x", "ping", None)).await;

    assert_eq!(outcome, DispatchOutcome::Dispatched { success: false });
}

#[tokio::test]
async fn no_notify_skips_provider_call_and_reports_success() {
    let sms = Arc::new(RecordingSms::with_outcome(ok_sms_outcome()));
    let email = Arc::new(RecordingEmail::with_outcome(ok_email_outcome()));
    let mut cfg = config();
    cfg.no_notify = true;
    let dispatcher = Dispatcher::new(sms.clone(), email.clone(), cfg);

    let outcome = dispatcher.dispatch(&row(9, "alice@example.com", "x", "x", None)).await;

    assert_eq!(outcome, DispatchOutcome::Dispatched { success: true });
    assert_eq!(email.calls.lock().unwrap().len(), 0);
    assert_eq!(sms.calls.lock().unwrap().len(), 0);
}
