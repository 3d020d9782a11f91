//! Classification: decide whether a claimed row's destination address is an
//! SMS target or an email target, and validate it.

use std::sync::OnceLock;

use regex::Regex;

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?\d{10,11}$").expect("valid regex"))
}

pub(crate) fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The stripped local part, ready for the provider call.
    Sms { target: String, domain: Option<String> },
    Email,
}

/// Classify and validate a destination address.
///
/// Returns `Err` when the row is an invalid email address — the caller must
/// archive it to `FailedMail` immediately without retrying.
pub fn classify(destination_address: &str) -> Result<Classification, InvalidDestination> {
    let mut parts = destination_address.splitn(2, '@');
    let local_raw = parts.next().unwrap_or("");
    let domain = parts.next();

    let local = strip_punctuation(local_raw);

    if phone_re().is_match(&local) {
        return Ok(Classification::Sms {
            target: local,
            domain: domain.map(str::to_string),
        });
    }

    if email_re().is_match(destination_address) {
        Ok(Classification::Email)
    } else {
        Err(InvalidDestination(destination_address.to_string()))
    }
}

/// Remove `()`, whitespace, and `-` from a local part, matching
/// `re.sub(r"[\(\)\s\-]","",target)` in `acs_messenger.py`.
fn strip_punctuation(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '(' | ')' | '-') && !c.is_whitespace())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDestination(pub String);

impl std::fmt::Display for InvalidDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid destination address: {}", self.0)
    }
}

impl std::error::Error for InvalidDestination {}
