//! Multi-worker wiring for the no-duplicate-dispatch property: construct
//! several independent actors against one shared resource and let them race.

use mail_db::{claim_batch, ClaimOptions, ClaimOutcome, Mode, WorkerIdentity};
use sqlx::PgPool;

/// Run `worker_count` independent `claim_batch` calls concurrently against
/// the same pool, each under its own `WorkerIdentity`, and return every
/// worker's outcome in spawn order.
///
/// Used to assert that the union of all `claimed` rows across every outcome
/// contains no duplicate `"ID"` — the claim protocol's core safety property
/// under real concurrency, not just sequential calls.
pub async fn spawn_concurrent_dispatchers(
    pool: &PgPool,
    worker_count: usize,
    mode: Option<Mode>,
    opts: ClaimOptions,
) -> Vec<ClaimOutcome> {
    let mut handles = Vec::with_capacity(worker_count);

    for n in 0..worker_count {
        let pool = pool.clone();
        let identity = WorkerIdentity::new(&format!("worker{n}"), mode, None);
        handles.push(tokio::spawn(async move {
            claim_batch(&pool, &identity, mode, opts)
                .await
                .expect("claim_batch should not fail under a healthy test pool")
        }));
    }

    let mut outcomes = Vec::with_capacity(worker_count);
    for handle in handles {
        outcomes.push(handle.await.expect("worker task panicked"));
    }
    outcomes
}

/// Every claimed row's `"ID"` across `outcomes`, asserting no ID appears
/// more than once.
pub fn assert_no_duplicate_claims(outcomes: &[ClaimOutcome]) {
    let mut seen = std::collections::HashSet::new();
    for outcome in outcomes {
        for claimed in &outcome.claimed {
            assert!(
                seen.insert(claimed.id),
                "row {} was claimed by more than one worker",
                claimed.id
            );
        }
    }
}
