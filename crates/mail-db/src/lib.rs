//! Queue Store Adapter: connection lifecycle, the claim protocol, and the
//! terminal-state archiver for the outbound mail worker.
//!
//! Every statement here is a pre-defined textual template. Only table names
//! and the three tunables (`MAX_AGE`, `FETCH_LIMIT`, `MAX_ATTEMPTS`) are
//! interpolated into query text, and only from this module's own closed
//! `Mode` enum — never from row data, which always flows through `.bind()`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod archive;
pub mod claim;
pub mod identity;

pub use archive::{archive_message, ArchiveDisposition};
pub use claim::{claim_batch, ClaimOptions, ClaimOutcome};
pub use identity::{Mode, WorkerIdentity};

pub const ENV_DB_URL: &str = "MAIL_DATABASE_URL";

/// Default per-call statement timeout.
pub const DB_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default claim batch size: `5 * num_cpus::get()`, matching
/// `acs_messenger_async.py`'s `FETCH_LIMIT = 5 * (os.cpu_count() or 1)`.
pub fn default_fetch_limit() -> i64 {
    5 * num_cpus::get() as i64
}

/// Default attempt budget before a row is given up on.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default orphan reclamation threshold.
pub const DEFAULT_MAX_AGE: chrono::Duration = chrono::Duration::minutes(15);

/// Errors this adapter can surface to callers.
///
/// `Transient` and `Timeout` are the two kinds the worker loop treats as
/// recoverable: reconnect and retry the next batch. Everything else is
/// either a bug in the caller (`Other`) or a schema-level invariant
/// violation (`Constraint`).
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    #[error("database call timed out after {0:?}")]
    Timeout(Duration),

    #[error("constraint violation: {0}")]
    Constraint(#[source] sqlx::Error),

    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

impl DbError {
    /// Whether the worker loop should reconnect and retry rather than treat
    /// the error as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DbError::Transient(_) | DbError::Timeout(_))
    }
}

/// Classify a raw `sqlx::Error`: connection resets, operational errors, and
/// pool timeouts are transient; everything else passes through
/// unclassified.
fn classify(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            DbError::Transient(err)
        }
        sqlx::Error::Database(db_err) => {
            // 08xxx = connection exception class in Postgres.
            if db_err.code().map(|c| c.starts_with("08")).unwrap_or(false) {
                DbError::Transient(err)
            } else if db_err.constraint().is_some() {
                DbError::Constraint(err)
            } else {
                DbError::Other(err)
            }
        }
        _ => DbError::Other(err),
    }
}

/// Run a database future under [`DB_CALL_TIMEOUT`], mapping an elapsed
/// timeout into the same recoverable variant a connection reset would
/// produce.
pub async fn with_timeout<F, T>(fut: F) -> Result<T, DbError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(DB_CALL_TIMEOUT, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(classify(e)),
        Err(_) => Err(DbError::Timeout(DB_CALL_TIMEOUT)),
    }
}

/// Connect to Postgres using `MAIL_DATABASE_URL`.
///
/// Sized to `max_connections` so a full claimed batch can overlap its
/// provider calls (each holding its own archive transaction) without pool
/// starvation.
pub async fn connect_from_env(max_connections: u32) -> anyhow::Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .map_err(|_| anyhow::anyhow!("missing env var {ENV_DB_URL}"))?;
    connect(&url, max_connections).await
}

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to Postgres: {e}"))?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| anyhow::anyhow!("db migrate failed: {e}"))?;
    Ok(())
}

/// A pending row as stored in `mail."MailQueue"`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub id: i64,
    pub destination_address: String,
    pub source_address: Option<String>,
    pub cc_address: Option<String>,
    pub bcc_address: Option<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Vec<u8>>,
    pub attempts: i32,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueuedMessage {
    /// A row classifies as a *report* iff it carries a non-empty attachment.
    pub fn is_report(&self) -> bool {
        matches!(&self.attachment, Some(bytes) if !bytes.is_empty())
    }
}

/// The snapshot returned by a successful claim: `processed_by` is always
/// `Some(self)` and `attempts` already reflects the increment performed by
/// the CAS update.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedMessage {
    pub message: QueuedMessage,
}

impl std::ops::Deref for ClaimedMessage {
    type Target = QueuedMessage;
    fn deref(&self) -> &QueuedMessage {
        &self.message
    }
}
