//! C9 Fleet Orchestrator: runs the nightly trigger across every active user.

use crate::classifier::LaughterClassifier;
use crate::config::Config;
use crate::error::Error;
use crate::pipeline;
use crate::store::{self, Trigger};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one user's run within a fleet sweep.
pub struct UserOutcome {
    /// The user this outcome belongs to.
    pub user_id: uuid::Uuid,
    /// `Err` if the run aborted; the fleet sweep itself never aborts on this.
    pub result: Result<(), Error>,
}

/// Run the nightly trigger for every active user (optionally restricted to
/// `user_filter`), sequentially, so classifier memory and the per-user HTTP
/// client are never held for more than one user at a time.
///
/// A single user's failure is logged and recorded in their own
/// `processing_logs` row; it never aborts the sweep for the rest of the
/// fleet.
///
/// # Errors
/// Returns an error only if listing active users itself fails — a problem
/// with the fleet as a whole, not with any one user.
pub async fn run_nightly(
    pool: &PgPool,
    config: &Config,
    classifier: Arc<dyn LaughterClassifier>,
    user_filter: Option<&[String]>,
) -> crate::error::Result<Vec<UserOutcome>> {
    let users = store::list_active_users(pool, user_filter).await?;
    info!(count = users.len(), "starting nightly fleet run");

    let progress = ProgressBar::new(users.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} users {msg}") {
        progress.set_style(style);
    }

    let mut outcomes = Vec::with_capacity(users.len());
    for user in &users {
        let tz = match pipeline::parse_timezone(&user.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "skipping user with unknown timezone");
                outcomes.push(UserOutcome {
                    user_id: user.id,
                    result: Err(e),
                });
                continue;
            }
        };

        let now = Utc::now();
        let (start, end) = pipeline::nightly_window(tz, now);
        let date_local = start.with_timezone(&tz).date_naive();

        let result = pipeline::run(
            pool,
            config,
            classifier.clone(),
            user,
            "run-nightly",
            Trigger::Cron,
            date_local,
            (start, end),
        )
        .await;

        match &result {
            Ok(counters) => info!(
                user_id = %user.id,
                rows_inserted = counters.rows_inserted(),
                "user run complete"
            ),
            Err(e) => error!(user_id = %user.id, error = %e, "user run failed"),
        }

        outcomes.push(UserOutcome {
            user_id: user.id,
            result: result.map(|_| ()),
        });
        progress.inc(1);

        // Each user gets a fresh HTTP client and decoded-audio buffers;
        // nothing from this iteration should outlive it.
    }
    progress.finish_and_clear();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        total = outcomes.len(),
        failed, "nightly fleet run complete"
    );

    Ok(outcomes)
}
