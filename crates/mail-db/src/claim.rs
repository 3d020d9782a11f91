//! Claim protocol: select eligible queue rows and hand each one to exactly
//! one worker, safely under concurrent dispatchers.
//!
//! Two-phase per batch:
//!   1. `select_candidates` reads up to `fetch_limit` eligible IDs under
//!      `FOR UPDATE SKIP LOCKED` in one short-lived transaction, committed
//!      immediately (the lock is only needed to avoid colliding with a peer
//!      also scanning the table; it does not need to survive past the read).
//!   2. `claim_one` opens a fresh transaction per candidate, re-acquires a
//!      transaction-scoped advisory lock on the row's ID (defensive — the
//!      candidate read and the update are two phases, so a peer could have
//!      claimed it in between), then performs the CAS update and commits.
//!
//! Per-row commits mean a crash between claiming row N and row N+1 loses
//! nothing: every committed claim is durable before any provider call is
//! made.

use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::identity::{Mode, WorkerIdentity};
use crate::{with_timeout, ClaimedMessage, DbError, QueuedMessage};

#[derive(Debug, Clone, Copy)]
pub struct ClaimOptions {
    pub fetch_limit: i64,
    pub max_attempts: i32,
    pub max_age: chrono::Duration,
    /// Dry-run (`--testing`): roll back the CAS instead of committing, so
    /// the queue is left byte-identical.
    pub dry_run: bool,
}

impl Default for ClaimOptions {
    fn default() -> Self {
        ClaimOptions {
            fetch_limit: crate::default_fetch_limit(),
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            max_age: crate::DEFAULT_MAX_AGE,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClaimOutcome {
    pub claimed: Vec<ClaimedMessage>,
    pub skipped: u32,
}

struct Candidate {
    id: i64,
    prior_owner: Option<String>,
}

pub async fn claim_batch(
    pool: &PgPool,
    identity: &WorkerIdentity,
    mode: Option<Mode>,
    opts: ClaimOptions,
) -> Result<ClaimOutcome, DbError> {
    let candidates = select_candidates(pool, identity, mode, opts).await?;

    let mut outcome = ClaimOutcome::default();
    for candidate in candidates {
        match claim_one(pool, identity, opts, &candidate).await? {
            Some(message) => outcome.claimed.push(ClaimedMessage { message }),
            None => outcome.skipped += 1,
        }
    }
    Ok(outcome)
}

async fn select_candidates(
    pool: &PgPool,
    identity: &WorkerIdentity,
    mode: Option<Mode>,
    opts: ClaimOptions,
) -> Result<Vec<Candidate>, DbError> {
    let mode_constraint = Mode::sql_constraint(mode);
    let sql = format!(
        r#"
        select "ID", processed_by
        from mail."MailQueue"
        where "deliveryMethod" is null
          and {mode_constraint}
          and attempts <= $1
          and (
              processed_by is null
              or processed_by = $2
              or (processed_by <> $2 and created_at < $3)
          )
        order by "ID" asc
        limit $4
        for update skip locked
        "#
    );

    let cutoff = Utc::now() - opts.max_age;

    let mut tx = with_timeout(pool.begin()).await?;
    let rows = with_timeout(
        sqlx::query(&sql)
            .bind(opts.max_attempts)
            .bind(identity.as_str())
            .bind(cutoff)
            .bind(opts.fetch_limit)
            .fetch_all(&mut *tx),
    )
    .await?;

    let candidates = rows
        .into_iter()
        .map(|row| {
            Ok(Candidate {
                id: row.try_get("ID")?,
                prior_owner: row.try_get("processed_by")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(DbError::Other)?;

    with_timeout(async { tx.commit().await }).await?;
    Ok(candidates)
}

async fn claim_one(
    pool: &PgPool,
    identity: &WorkerIdentity,
    opts: ClaimOptions,
    candidate: &Candidate,
) -> Result<Option<QueuedMessage>, DbError> {
    let mut tx = with_timeout(pool.begin()).await?;

    let (lock_acquired,): (bool,) = with_timeout(
        sqlx::query_as("select pg_try_advisory_xact_lock($1)")
            .bind(candidate.id)
            .fetch_one(&mut *tx),
    )
    .await?;

    if !lock_acquired {
        tracing::debug!(id = candidate.id, "advisory lock not acquired, skipping");
        with_timeout(async { tx.rollback().await }).await?;
        return Ok(None);
    }

    let row = with_timeout(
        sqlx::query(
            r#"
            update mail."MailQueue"
            set processed_by = $1, attempts = attempts + 1
            where "ID" = $2
              and ((processed_by is null and $3::text is null) or processed_by = $3)
            returning "ID", "DestinationAddress", "SourceAddress", "CC_Address",
                      "BCC_Address", "Subject", "Body", "Attachment", attempts,
                      processed_by, created_at
            "#,
        )
        .bind(identity.as_str())
        .bind(candidate.id)
        .bind(&candidate.prior_owner)
        .fetch_optional(&mut *tx),
    )
    .await?;

    let Some(row) = row else {
        tracing::debug!(id = candidate.id, "claimed by another worker, skipping");
        with_timeout(async { tx.rollback().await }).await?;
        return Ok(None);
    };

    let message = QueuedMessage {
        id: row.try_get("ID").map_err(DbError::Other)?,
        destination_address: row
            .try_get("DestinationAddress")
            .map_err(DbError::Other)?,
        source_address: row.try_get("SourceAddress").map_err(DbError::Other)?,
        cc_address: row.try_get("CC_Address").map_err(DbError::Other)?,
        bcc_address: row.try_get("BCC_Address").map_err(DbError::Other)?,
        subject: row.try_get("Subject").map_err(DbError::Other)?,
        body: row.try_get("Body").map_err(DbError::Other)?,
        attachment: row.try_get("Attachment").map_err(DbError::Other)?,
        attempts: row.try_get("attempts").map_err(DbError::Other)?,
        processed_by: row.try_get("processed_by").map_err(DbError::Other)?,
        created_at: row.try_get("created_at").map_err(DbError::Other)?,
    };

    if opts.dry_run {
        with_timeout(async { tx.rollback().await }).await?;
    } else {
        with_timeout(async { tx.commit().await }).await?;
    }

    Ok(Some(message))
}
