//! Worker identity and mode partitioning.

use std::fmt;

/// Which half of the queue a worker instance is allowed to touch.
///
/// `None` (the caller's `Option<Mode>`) stands in for "no filter" — the
/// worker drains both reports and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rows with a non-empty `Attachment`.
    Report,
    /// Rows with no `Attachment`.
    Notification,
}

impl Mode {
    /// Parse a CLI-supplied mode string, tolerating a trailing `s`
    /// (`"reports"` / `"notifications"`) exactly as `acs_messenger.py`'s
    /// `parse_args` does with `re.sub(r's$', '', ...)`.
    pub fn parse(raw: &str) -> Result<Self, InvalidMode> {
        let trimmed = raw.trim().to_ascii_lowercase();
        let stripped = trimmed.strip_suffix('s').unwrap_or(&trimmed);
        match stripped {
            "report" => Ok(Mode::Report),
            "notification" => Ok(Mode::Notification),
            _ => Err(InvalidMode(raw.to_string())),
        }
    }

    /// The SQL fragment the claim query interpolates into the
    /// candidate-select template. Closed enum, never user input.
    pub fn sql_constraint(mode: Option<Mode>) -> &'static str {
        match mode {
            Some(Mode::Report) => r#""Attachment" IS NOT NULL"#,
            Some(Mode::Notification) => r#""Attachment" IS NULL"#,
            None => "TRUE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Report => "report",
            Mode::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMode(pub String);

impl fmt::Display for InvalidMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid mode value: {}", self.0)
    }
}

impl std::error::Error for InvalidMode {}

/// `{hostname}[-{mode}][-{job_id}]`, lowercased.
///
/// Two processes with the same identity are duplicates: the claim protocol
/// treats them as a single owner for CAS and orphan-reclaim purposes, and
/// the process singleton guard refuses to start a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    pub fn new(hostname: &str, mode: Option<Mode>, job_id: Option<&str>) -> Self {
        let mut id = hostname.to_string();
        if let Some(m) = mode {
            id.push('-');
            id.push_str(m.as_str());
        }
        if let Some(j) = job_id {
            id.push('-');
            id.push_str(j);
        }
        WorkerIdentity(id.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_strips_trailing_s() {
        assert_eq!(Mode::parse("reports").unwrap(), Mode::Report);
        assert_eq!(Mode::parse("notifications").unwrap(), Mode::Notification);
        assert_eq!(Mode::parse("Report").unwrap(), Mode::Report);
    }

    #[test]
    fn mode_parse_rejects_unknown() {
        assert!(Mode::parse("bogus").is_err());
    }

    #[test]
    fn identity_combines_parts_lowercased() {
        let id = WorkerIdentity::new("HOST1", Some(Mode::Report), Some("job7"));
        assert_eq!(id.as_str(), "host1-report-job7");
    }

    #[test]
    fn identity_without_mode_or_job() {
        let id = WorkerIdentity::new("Host1", None, None);
        assert_eq!(id.as_str(), "host1");
    }
}
