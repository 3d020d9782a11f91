//! A report worker never touches a row with no attachment, and vice versa.

mod common;

use mail_db::{claim_batch, ClaimOptions, Mode, WorkerIdentity};

#[tokio::test]
#[ignore = "requires MAIL_DATABASE_URL; run with a live Postgres instance"]
async fn notification_worker_ignores_report_rows() {
    let pool = common::scenario_pool().await;
    common::insert_row(&pool, "carol@example.com", "Daily Report", "...", Some(b"a,b,c\n1,2,3\n")).await;

    let worker = WorkerIdentity::new("host", Some(Mode::Notification), None);
    let outcome = claim_batch(&pool, &worker, Some(Mode::Notification), ClaimOptions::default())
        .await
        .unwrap();

    assert!(outcome.claimed.is_empty());
}

#[tokio::test]
#[ignore = "requires MAIL_DATABASE_URL; run with a live Postgres instance"]
async fn report_worker_claims_attachment_rows() {
    let pool = common::scenario_pool().await;
    common::insert_row(&pool, "carol@example.com", "Daily Report", "...", Some(b"a,b,c\n1,2,3\n")).await;

    let worker = WorkerIdentity::new("host", Some(Mode::Report), None);
    let outcome = claim_batch(&pool, &worker, Some(Mode::Report), ClaimOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.claimed.len(), 1);
    assert!(outcome.claimed[0].is_report());
}
