//! `mail-cli` entry point: parses the flag surface, resolves config and
//! secrets exactly once, builds the provider clients and the database pool,
//! and hands everything to a `mail_worker::Worker`.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mail_db::{ClaimOptions, Mode, WorkerIdentity};
use mail_dispatch::{DispatchConfig, Overrides, TWILIO_MAGIC_TEST_NUMBER};
use mail_provider_email::SendGridEmailProvider;
use mail_provider_sms::TwilioSmsProvider;
use mail_worker::{install_signal_handlers, Worker, WorkerOptions};

/// Env var carrying the Twilio "from" number; not a secret, just config the
/// original script hardcoded as `my_twilio_phone_number`.
const ENV_SMS_FROM: &str = "MAIL_SMS_FROM";
/// Env var carrying the default email "from" address used when a row has no
/// `SourceAddress`, generalized from the hardcoded sender override in
/// `acs_messenger.py::send_email`.
const ENV_EMAIL_FROM: &str = "MAIL_EMAIL_FROM";

#[derive(Parser, Debug)]
#[command(name = "mail-cli")]
#[command(about = "Drains mail.\"MailQueue\" into SMS and email delivery", long_about = None)]
struct Cli {
    /// Only claim report rows (has attachment) or notification rows (no
    /// attachment); a trailing `s` is tolerated and stripped.
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,

    /// Run continuously with polling instead of exiting after one batch.
    #[arg(short = 'l', long = "loop")]
    loop_forever: bool,

    /// Verbose logging, including an additional stdout layer.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Dry-run: DB writes are rolled back.
    #[arg(short = 't', long = "testing")]
    testing: bool,

    /// Never call providers; report success without dispatching.
    #[arg(short = 'n', long = "no-notify")]
    no_notify: bool,

    /// Replace the destination address for email rows.
    #[arg(short = 'e', long = "email")]
    email: Option<String>,

    /// Replace the destination address for SMS rows. The value `twilio`
    /// resolves to Twilio's documented magic test number.
    #[arg(short = 'p', long = "phone")]
    phone: Option<String>,

    /// Suffix appended to the worker identifier.
    #[arg(short = 'j', long = "job-id")]
    job_id: Option<String>,

    /// Base polling interval in seconds; actual sleep is jittered to
    /// `interval * Uniform(0.8, 1.2)`.
    #[arg(short = 'i', long = "interval", default_value_t = 1.0)]
    interval: f64,

    /// Log file destination. Defaults to a `logs` directory next to the
    /// executable.
    #[arg(short = 'L', long = "log-dir")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    let mode = cli
        .mode
        .as_deref()
        .map(Mode::parse)
        .transpose()
        .context("invalid --mode value")?;

    let home = std::env::var("HOME").context("missing env var HOME")?;
    let secrets = mail_config::resolve_secrets().context("failed to resolve secrets")?;
    let loaded_db = mail_config::load_db_params(&home, secrets.pgpassword.clone())
        .context("failed to load db_params.json")?;

    let identity = WorkerIdentity::new(&hostname(), mode, cli.job_id.as_deref());

    let _guard = init_tracing(&identity, cli.log_dir.clone(), cli.debug)?;

    tracing::info!(
        %identity,
        config_hash = %loaded_db.config_hash,
        mode = ?mode,
        loop_forever = cli.loop_forever,
        testing = cli.testing,
        "starting mail worker"
    );

    mail_worker::assert_unique(&identity).context("another worker with this identity is running")?;

    let pool_size = WorkerOptions::default_max_concurrency() as u32;
    let pool = mail_db::connect(&loaded_db.params.connection_url(), pool_size)
        .await
        .context("failed to connect to Postgres")?;
    mail_db::migrate(&pool).await.context("failed to run migrations")?;

    let http_client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let sms_provider = TwilioSmsProvider::new(
        http_client.clone(),
        secrets.twilio_account_sid.clone(),
        secrets.twilio_api_key_sid.clone(),
        secrets.twilio_api_key_secret.clone(),
    );
    let email_provider = SendGridEmailProvider::new(http_client, secrets.sendgrid_api_key.clone());

    let sms_from = std::env::var(ENV_SMS_FROM).context("missing env var MAIL_SMS_FROM")?;
    let email_from = std::env::var(ENV_EMAIL_FROM).context("missing env var MAIL_EMAIL_FROM")?;

    let phone_override = cli.phone.map(|p| {
        if p.eq_ignore_ascii_case("twilio") {
            TWILIO_MAGIC_TEST_NUMBER.to_string()
        } else {
            p
        }
    });

    let dispatch_config = DispatchConfig {
        sms_from,
        email_from,
        overrides: Overrides {
            email: cli.email,
            phone: phone_override,
        },
        no_notify: cli.no_notify,
    };

    let claim_options = ClaimOptions {
        dry_run: cli.testing,
        ..ClaimOptions::default()
    };

    let worker_options = WorkerOptions {
        mode,
        claim: claim_options,
        loop_forever: cli.loop_forever,
        interval: Duration::from_secs_f64(cli.interval.max(0.0)),
        max_concurrency: WorkerOptions::default_max_concurrency(),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(shutdown.clone());

    let worker = Worker::new(
        pool,
        identity,
        Arc::new(sms_provider),
        Arc::new(email_provider),
        dispatch_config,
        worker_options,
        shutdown,
    );

    worker.run().await
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Build the `tracing` subscriber: a rolling-daily file appender under
/// `log_dir`, retaining 7 days, plus an optional stdout layer under
/// `--debug` — generalized from `acs_messenger.py::initialize_logs`'s
/// "add a StreamHandler only in debug mode".
fn init_tracing(
    identity: &WorkerIdentity,
    log_dir: Option<PathBuf>,
    debug: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(identity.as_str())
        .filename_suffix("log")
        .max_log_files(7)
        .build(&log_dir)
        .with_context(|| format!("failed to build log appender in {}", log_dir.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| if debug { "debug".into() } else { "info".into() });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    if debug {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout)).init();
    } else {
        registry.init();
    }

    Ok(guard)
}

fn default_log_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}
