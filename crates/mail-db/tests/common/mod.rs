use sqlx::PgPool;

/// Connect against `MAIL_DATABASE_URL`, apply migrations, and truncate the
/// three mail tables so each scenario starts from a clean slate.
pub async fn scenario_pool() -> PgPool {
    let pool = mail_db::connect_from_env(10)
        .await
        .expect("connect to MAIL_DATABASE_URL");
    mail_db::migrate(&pool).await.expect("migrate");

    sqlx::query(r#"truncate mail."MailQueue", mail."MailArchive", mail."FailedMail""#)
        .execute(&pool)
        .await
        .expect("truncate mail tables");

    pool
}

pub async fn insert_row(
    pool: &PgPool,
    destination: &str,
    subject: &str,
    body: &str,
    attachment: Option<&[u8]>,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into mail."MailQueue" ("DestinationAddress", "Subject", "Body", "Attachment")
        values ($1, $2, $3, $4)
        returning "ID"
        "#,
    )
    .bind(destination)
    .bind(subject)
    .bind(body)
    .bind(attachment)
    .fetch_one(pool)
    .await
    .expect("insert row");
    id
}

pub async fn backdate_created_at(pool: &PgPool, id: i64, minutes_ago: i64) {
    sqlx::query(
        r#"update mail."MailQueue" set created_at = now() - ($2 || ' minutes')::interval where "ID" = $1"#,
    )
    .bind(id)
    .bind(minutes_ago.to_string())
    .execute(pool)
    .await
    .expect("backdate created_at");
}
