//! Laughter-detection ingestion pipeline.
//!
//! Fetches a user's wearable audio in time-bounded chunks, runs a laughter
//! classifier over each chunk, writes clips for above-threshold events, and
//! persists deduplicated detections to Postgres — with an orphan-reconciler
//! sweep keeping the filesystem and the database from drifting apart across
//! retries, restarts, and concurrent re-processing runs.

#![warn(missing_docs)]

pub mod audio;
pub mod classifier;
pub mod cli;
pub mod clipper;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod fleet;
pub mod locking;
pub mod logging;
pub mod pipeline;
pub mod reconciler;
pub mod store;
pub mod time_chunker;
pub mod upstream;

pub use error::{Error, Result};

use classifier::LaughterClassifier;
use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use store::Trigger;
use tracing::{error, info};

/// Parse CLI arguments, run the requested command end to end, and return
/// the process exit code (0 on success, 1 or 2 on failure per
/// [`Error::exit_code`]).
#[must_use]
pub fn run() -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return 1;
        }
    };
    runtime.block_on(run_async())
}

async fn run_async() -> i32 {
    let cli = Cli::parse();
    match try_run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

async fn try_run(cli: Cli) -> Result<i32> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.upload_dir.clone() {
        config.upload_dir = dir;
    }
    logging::init(cli.verbose, config.verbose_logs);

    let pool = store::connect(&config.db_url).await?;
    store::migrate(&pool).await?;

    install_shutdown_hook();

    match cli.command {
        Command::RunNightly { users } => run_nightly(&pool, &config, &users).await,
        Command::UpdateToday { user } => run_update_today(&pool, &config, &user).await,
        Command::Reprocess { user, from, to } => {
            run_reprocess(&pool, &config, &user, from, to).await
        }
        Command::Reconcile { user } => run_reconcile(&pool, &config, &user).await,
    }
}

async fn run_nightly(pool: &PgPool, config: &Config, users: &[String]) -> Result<i32> {
    let classifier = load_classifier(config)?;
    let filter = if users.is_empty() { None } else { Some(users) };
    let outcomes = fleet::run_nightly(pool, config, classifier, filter).await?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    Ok(i32::from(failed > 0))
}

async fn run_update_today(pool: &PgPool, config: &Config, user_identifier: &str) -> Result<i32> {
    let classifier = load_classifier(config)?;
    let user = store::find_user(pool, user_identifier).await?;
    let tz = pipeline::parse_timezone(&user.timezone)?;

    let now = chrono::Utc::now();
    let (start_of_day, _) = pipeline::local_day_window(tz, now.with_timezone(&tz).date_naive());
    let latest_end = store::latest_end_for_today(pool, user.id, start_of_day).await?;
    let window = pipeline::update_today_window(tz, now, latest_end);
    let date_local = now.with_timezone(&tz).date_naive();

    pipeline::run(
        pool,
        config,
        classifier,
        &user,
        "update-today",
        Trigger::Scheduled,
        date_local,
        window,
    )
    .await?;
    Ok(0)
}

async fn run_reprocess(
    pool: &PgPool,
    config: &Config,
    user_identifier: &str,
    from: chrono::NaiveDate,
    to: chrono::NaiveDate,
) -> Result<i32> {
    let classifier = load_classifier(config)?;
    let user = store::find_user(pool, user_identifier).await?;
    let tz = pipeline::parse_timezone(&user.timezone)?;

    for window in pipeline::reprocess_windows(tz, from, to) {
        store::delete_range(pool, user.id, window.start, window.end).await?;

        pipeline::run(
            pool,
            config,
            Arc::clone(&classifier),
            &user,
            "reprocess",
            Trigger::Manual,
            window.date_local,
            (window.start, window.end),
        )
        .await?;
    }
    Ok(0)
}

async fn run_reconcile(pool: &PgPool, config: &Config, user_identifier: &str) -> Result<i32> {
    let user = store::find_user(pool, user_identifier).await?;
    let report = reconciler::reconcile(
        pool,
        config,
        user.id,
        &std::collections::HashSet::new(),
        reconciler::ReconcileScope::FullHistory,
    )
    .await?;
    info!(
        orphans_deleted = report.orphans_deleted,
        delete_failures = report.delete_failures,
        "reconciliation complete"
    );
    Ok(0)
}

fn load_classifier(config: &Config) -> Result<Arc<dyn LaughterClassifier>> {
    let cache_dir = classifier::default_cache_dir();
    let onnx = classifier::global(&config.model_path, &cache_dir)?;
    Ok(onnx as Arc<dyn LaughterClassifier>)
}

/// Install the `ctrlc` handler that removes every held lock file before the
/// process exits, so a signal during a run never leaves a stale lock behind.
fn install_shutdown_hook() {
    let result = ctrlc::set_handler(|| {
        locking::cleanup_all_locks();
        std::process::exit(130);
    });
    if let Err(e) = result {
        error!(error = %e, "failed to install shutdown signal handler");
    }
}
