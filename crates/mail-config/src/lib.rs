//! Config loading and secret resolution for the mail worker.
//!
//! A JSON/env source is loaded once at startup, hashed for log-line
//! provenance, and handed to constructors as a typed value. Callers never
//! scatter `std::env::var` calls of their own — everything flows through
//! [`db_params::load_db_params`] and [`secrets::resolve_secrets`].

pub mod db_params;
pub mod secrets;

pub use db_params::{load_db_params, DbParams, LoadedDbParams};
pub use secrets::{resolve_secrets, ResolvedSecrets};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("required environment variable {0} is not set or empty")]
    MissingSecret(&'static str),
    #[error("{0}")]
    Other(String),
}
