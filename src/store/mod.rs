//! `sqlx`-backed Postgres access layer implementing the C3/C6/C7 table contracts.

mod detections;
mod models;
mod processing_log;
mod segments;

pub use detections::{Candidate, Decision, SkipReason, apply_decision, decide};
pub use models::{
    ApiCallRecord, AudioSegment, LaughterDetection, ProcessingLog, RunStatus, Trigger, User,
    UpstreamCredential,
};
pub use processing_log::{RunCounters, upsert as upsert_processing_log};
pub use segments::{
    already_overlaps_processed, delete_file, delete_range, insert, latest_end_for_today,
    list_file_paths, mark_processed,
};

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a connection pool sized for the fleet's sequential-per-user model:
/// one connection per concurrently processed user plus headroom for the
/// daily-trigger loop.
pub async fn connect(db_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(pool)
}

/// Run pending migrations. Called once at process startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Look up a user by id (UUID string) or, failing that, by email.
///
/// # Errors
/// Returns [`crate::Error::UserNotFound`] if neither lookup matches.
pub async fn find_user(pool: &PgPool, identifier: &str) -> Result<User> {
    if let Ok(id) = uuid::Uuid::parse_str(identifier)
        && let Some(user) = sqlx::query_as::<_, User>(
            "SELECT id, email, timezone, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(user);
    }

    sqlx::query_as::<_, User>(
        "SELECT id, email, timezone, is_active FROM users WHERE email = $1",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| crate::Error::UserNotFound {
        identifier: identifier.to_string(),
    })
}

/// List all users with an active upstream credential, optionally filtered to
/// a set of ids or emails (preserving the order of the filter list).
///
/// "Active" here means an active `upstream_keys` row, not `users.is_active`:
/// a user is only worth sweeping if the pipeline can actually authenticate
/// to the upstream service on their behalf.
pub async fn list_active_users(
    pool: &PgPool,
    filter: Option<&[String]>,
) -> Result<Vec<User>> {
    let Some(filter) = filter else {
        return Ok(sqlx::query_as::<_, User>(
            "SELECT DISTINCT u.id, u.email, u.timezone, u.is_active \
             FROM users u JOIN upstream_keys k ON k.user_id = u.id \
             WHERE k.is_active = true",
        )
        .fetch_all(pool)
        .await?);
    };

    let mut ordered = Vec::with_capacity(filter.len());
    for identifier in filter {
        if let Ok(user) = find_user(pool, identifier).await
            && active_credential(pool, user.id).await?.is_some()
        {
            ordered.push(user);
        }
    }
    Ok(ordered)
}

/// Fetch the user's single active upstream credential, if any.
pub async fn active_credential(pool: &PgPool, user_id: uuid::Uuid) -> Result<Option<UpstreamCredential>> {
    let row = sqlx::query_as::<_, UpstreamCredential>(
        "SELECT id, user_id, encrypted_secret, is_active FROM upstream_keys \
         WHERE user_id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
