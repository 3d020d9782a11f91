//! Worker Loop (C5): `INIT -> RUNNING -> {RECONNECTING -> RUNNING | EXITING}`.
//!
//! Each iteration claims a batch, fans the claimed rows out to bounded
//! concurrent dispatch+archive tasks, and either sleeps (loop mode) or
//! exits (one-shot mode). A recoverable `DbError` moves the state machine
//! to `RECONNECTING` rather than terminating the process; anything else is
//! fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mail_db::{
    archive_message, claim_batch, ArchiveDisposition, ClaimOptions, DbError, Mode, WorkerIdentity,
};
use mail_dispatch::{DispatchConfig, DispatchOutcome, Dispatcher, EmailProvider, SmsProvider};
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Reconnecting,
    Exiting,
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub mode: Option<Mode>,
    pub claim: ClaimOptions,
    /// `--loop`: poll forever instead of exiting after one batch.
    pub loop_forever: bool,
    /// Base polling interval; each sleep is jittered to `interval *
    /// Uniform(0.8, 1.2)`, matching `acs_messenger.py`'s
    /// `random.uniform(0.8, 1.2)`.
    pub interval: Duration,
    /// Upper bound on concurrently in-flight per-row dispatch+archive tasks.
    pub max_concurrency: usize,
}

impl WorkerOptions {
    /// `min(32, 5 * num_cpus::get())`, matching
    /// `acs_messenger_async.py`'s `MAX_CONCURRENT_TASKS`.
    pub fn default_max_concurrency() -> usize {
        (5 * num_cpus::get()).min(32)
    }
}

pub struct Worker<S: SmsProvider, E: EmailProvider> {
    pool: PgPool,
    identity: WorkerIdentity,
    dispatcher: Dispatcher<S, E>,
    options: WorkerOptions,
    shutdown: Arc<AtomicBool>,
    concurrency: Arc<Semaphore>,
}

pub struct BatchReport {
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl BatchReport {
    fn processed(&self) -> u32 {
        self.success + self.failed + self.skipped
    }
}

impl<S, E> Worker<S, E>
where
    S: SmsProvider + Clone + Send + Sync + 'static,
    E: EmailProvider + Clone + Send + Sync + 'static,
{
    pub fn new(
        pool: PgPool,
        identity: WorkerIdentity,
        sms: S,
        email: E,
        dispatch_config: DispatchConfig,
        options: WorkerOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let max_concurrency = options.max_concurrency.max(1);
        Worker {
            pool,
            identity,
            dispatcher: Dispatcher::new(sms, email, dispatch_config),
            options,
            shutdown,
            concurrency: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Run the state machine until `shutdown` is set or a one-shot pass
    /// completes. Returns `Ok(())` on a clean exit; a fatal (non-recoverable)
    /// error is returned so the caller can terminate the process.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut state = State::Running;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!(identity = %self.identity, "shutdown requested, exiting");
                return Ok(());
            }

            match state {
                State::Running => match self.run_one_batch().await {
                    Ok(report) => {
                        if report.processed() > 0 {
                            tracing::debug!(
                                success = report.success,
                                failed = report.failed,
                                skipped = report.skipped,
                                "batch complete"
                            );
                        }

                        if !self.options.loop_forever {
                            return Ok(());
                        }

                        self.sleep_with_jitter().await;
                    }
                    Err(err) if err.is_recoverable() => {
                        tracing::warn!(%err, "recoverable database error, reconnecting");
                        state = State::Reconnecting;
                    }
                    Err(err) => {
                        tracing::error!(%err, "fatal database error");
                        return Err(err.into());
                    }
                },
                State::Reconnecting => {
                    self.sleep_with_jitter().await;
                    match self.pool.acquire().await {
                        Ok(_) => state = State::Running,
                        Err(err) => {
                            tracing::warn!(%err, "pool still unavailable, retrying");
                        }
                    }
                }
                State::Exiting => return Ok(()),
            }
        }
    }

    async fn sleep_with_jitter(&self) {
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        let millis = (self.options.interval.as_secs_f64() * jitter * 1000.0).max(0.0);
        tokio::time::sleep(Duration::from_millis(millis as u64)).await;
    }

    async fn run_one_batch(&self) -> Result<BatchReport, DbError> {
        let outcome = claim_batch(&self.pool, &self.identity, self.options.mode, self.options.claim).await?;

        let mut handles = Vec::with_capacity(outcome.claimed.len());
        for claimed in outcome.claimed {
            let permit = self.concurrency.clone().acquire_owned().await.expect("semaphore never closed");
            let pool = self.pool.clone();
            let dispatcher = self.dispatcher.clone();
            let max_attempts = self.options.claim.max_attempts;
            let dry_run = self.options.claim.dry_run;

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                dispatch_and_archive(&pool, &dispatcher, claimed, max_attempts, dry_run).await
            }));
        }

        let mut success = 0;
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(true)) => success += 1,
                Ok(Ok(false)) => failed += 1,
                Ok(Err(err)) => {
                    tracing::error!(%err, "archive failed for claimed row");
                    failed += 1;
                }
                Err(join_err) => {
                    tracing::error!(%join_err, "dispatch task panicked");
                    failed += 1;
                }
            }
        }

        Ok(BatchReport {
            success,
            failed,
            skipped: outcome.skipped,
        })
    }
}

/// Install `SIGINT`/`SIGTERM` handlers that flip `shutdown` to `true`,
/// checked at the top of every loop iteration.
pub fn install_signal_handlers(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("received shutdown signal");
        shutdown.store(true, Ordering::SeqCst);
    });
}

/// Dispatch one claimed row and archive it to its terminal table per the
/// archive policy: success always archives; failure archives only once
/// `attempts` has reached the cap, otherwise the row is left in the queue
/// for a future retry.
async fn dispatch_and_archive<S: SmsProvider, E: EmailProvider>(
    pool: &PgPool,
    dispatcher: &Dispatcher<S, E>,
    claimed: mail_db::ClaimedMessage,
    max_attempts: i32,
    dry_run: bool,
) -> Result<bool, DbError> {
    let outcome = dispatcher.dispatch(&claimed).await;

    match outcome {
        DispatchOutcome::Invalid => {
            archive_message(pool, &claimed, ArchiveDisposition::Failure, dry_run).await?;
            Ok(false)
        }
        DispatchOutcome::Dispatched { success: true } => {
            archive_message(pool, &claimed, ArchiveDisposition::Success, dry_run).await?;
            Ok(true)
        }
        DispatchOutcome::Dispatched { success: false } => {
            if claimed.attempts >= max_attempts {
                archive_message(pool, &claimed, ArchiveDisposition::Failure, dry_run).await?;
            }
            Ok(false)
        }
    }
}
