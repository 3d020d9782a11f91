//! Single source of truth for runtime secret resolution.
//!
//! Callers invoke [`resolve_secrets`] once at startup; the returned
//! [`ResolvedSecrets`] is passed into provider constructors. `Debug` redacts
//! every field: never scatter `std::env::var` calls across the codebase, and
//! never let a secret value reach a log line.

use crate::ConfigError;

pub const ENV_TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const ENV_TWILIO_API_KEY_SID: &str = "TWILIO_CLIENT_API_KEY_SID";
pub const ENV_TWILIO_API_KEY_SECRET: &str = "TWILIO_CLIENT_API_KEY_SECRET";
pub const ENV_SENDGRID_API_KEY: &str = "SENDGRID_CLIENT_API_KEY";
pub const ENV_PGPASSWORD: &str = "PGPASSWORD";

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub twilio_account_sid: String,
    pub twilio_api_key_sid: String,
    pub twilio_api_key_secret: String,
    pub sendgrid_api_key: String,
    pub pgpassword: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("twilio_account_sid", &"<REDACTED>")
            .field("twilio_api_key_sid", &"<REDACTED>")
            .field("twilio_api_key_secret", &"<REDACTED>")
            .field("sendgrid_api_key", &"<REDACTED>")
            .field("pgpassword", &self.pgpassword.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn resolve_env(var_name: &'static str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn require_env(var_name: &'static str) -> Result<String, ConfigError> {
    resolve_env(var_name).ok_or(ConfigError::MissingSecret(var_name))
}

/// All Twilio and SendGrid secrets are required unconditionally: unlike the
/// teacher's mode-gated broker secrets, every mail-worker invocation (report
/// or notification) can end up dispatching either an SMS or an email row.
pub fn resolve_secrets() -> Result<ResolvedSecrets, ConfigError> {
    Ok(ResolvedSecrets {
        twilio_account_sid: require_env(ENV_TWILIO_ACCOUNT_SID)?,
        twilio_api_key_sid: require_env(ENV_TWILIO_API_KEY_SID)?,
        twilio_api_key_secret: require_env(ENV_TWILIO_API_KEY_SECRET)?,
        sendgrid_api_key: require_env(ENV_SENDGRID_API_KEY)?,
        pgpassword: resolve_env(ENV_PGPASSWORD),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_never_contains_secret_values() {
        let secrets = ResolvedSecrets {
            twilio_account_sid: "ACxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx".to_string(),
            twilio_api_key_sid: "SKxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx".to_string(),
            twilio_api_key_secret: "supersecret".to_string(),
            sendgrid_api_key: "SG.supersecret".to_string(),
            pgpassword: Some("hunter2".to_string()),
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("SG."));
        assert!(rendered.contains("<REDACTED>"));
    }
}
