//! Archiver: moves a claimed row out of `mail."MailQueue"` into either
//! `mail."MailArchive"` (success) or `mail."FailedMail"` (failure), inside
//! one transaction so the delete and insert are atomic. Attachment bytes are
//! discarded at this boundary — terminal tables never carry the
//! `Attachment` column at all.

use sqlx::PgPool;

use crate::{with_timeout, ClaimedMessage, DbError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveDisposition {
    Success,
    Failure,
}

impl ArchiveDisposition {
    fn table(self) -> &'static str {
        match self {
            ArchiveDisposition::Success => r#"mail."MailArchive""#,
            ArchiveDisposition::Failure => r#"mail."FailedMail""#,
        }
    }
}

/// Move `claimed` into its terminal table.
///
/// `dry_run` mirrors the claim protocol's testing mode: the delete+insert
/// is rolled back rather than committed, so `--testing` leaves all three
/// tables byte-identical.
pub async fn archive_message(
    pool: &PgPool,
    claimed: &ClaimedMessage,
    disposition: ArchiveDisposition,
    dry_run: bool,
) -> Result<(), DbError> {
    let mut tx = with_timeout(pool.begin()).await?;

    with_timeout(
        sqlx::query(r#"delete from mail."MailQueue" where "ID" = $1"#)
            .bind(claimed.id)
            .execute(&mut *tx),
    )
    .await?;

    let insert_sql = format!(
        r#"
        insert into {table}
            ("ID", "DestinationAddress", "SourceAddress", "CC_Address", "BCC_Address",
             "Subject", "Body", processed_by, "DateSent")
        values ($1, $2, $3, $4, $5, $6, $7, $8, now())
        "#,
        table = disposition.table()
    );

    with_timeout(
        sqlx::query(&insert_sql)
            .bind(claimed.id)
            .bind(&claimed.destination_address)
            .bind(&claimed.source_address)
            .bind(&claimed.cc_address)
            .bind(&claimed.bcc_address)
            .bind(&claimed.subject)
            .bind(&claimed.body)
            .bind(&claimed.processed_by)
            .execute(&mut *tx),
    )
    .await?;

    if dry_run {
        with_timeout(async { tx.rollback().await }).await?;
    } else {
        with_timeout(async { tx.commit().await }).await?;
    }

    Ok(())
}
