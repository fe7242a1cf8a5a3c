//! C10 Orphan Reconciler: cross-checks on-disk files against DB rows.

use crate::config::Config;
use crate::constants::DB_PAGE_SIZE;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// How far back a reconciliation sweep reaches.
///
/// The pre/post-flight calls a pipeline run makes are scoped to recent
/// history only — sweeping a user's entire clip history on every run would
/// mean paging through years of `laughter_detections` rows just to clear
/// crash debris from the current invocation. The explicit `pipeline
/// reconcile` CLI command opts into [`ReconcileScope::FullHistory`] instead.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileScope {
    /// Bound known-file lookups, and orphan deletion, to rows/files no
    /// older than `since`.
    Recent {
        /// Lower bound; rows/files older than this are left untouched.
        since: DateTime<Utc>,
    },
    /// Unbounded sweep over the user's entire history.
    FullHistory,
}

impl ReconcileScope {
    fn since(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Recent { since } => Some(since),
            Self::FullHistory => None,
        }
    }
}

/// Run the reconciliation sweep for `user_id`, bounded by `scope`.
///
/// `exclusion` is the session exclusion set: absolute clip paths written
/// during the current pipeline invocation, which must never be deleted
/// even though a follow-up read of the DB might not see them yet.
///
/// Under [`ReconcileScope::Recent`], a file is only deleted as an orphan if
/// it is both unknown to the DB *and* was modified at or after `since` —
/// an unknown file older than the cutoff is left alone rather than
/// misclassified, since the narrowed known-set query used in this mode
/// does not see far enough back to vouch for it either way.
///
/// # Errors
/// Propagates database errors from collecting the known-file sets; a
/// failure to delete any single orphan file is logged and does not abort
/// the sweep.
pub async fn reconcile(
    pool: &PgPool,
    config: &Config,
    user_id: Uuid,
    exclusion: &HashSet<PathBuf>,
    scope: ReconcileScope,
) -> Result<ReconcileReport> {
    let since = scope.since();
    let known_audio = known_audio_paths(pool, user_id, since).await?;
    let known_clips = known_clip_paths(pool, user_id, since).await?;

    let user_id_str = user_id.to_string();
    let mut report = ReconcileReport::default();

    sweep_dir(
        &config.audio_dir(&user_id_str),
        &known_audio,
        exclusion,
        since,
        &mut report,
    )
    .await;
    sweep_dir(
        &config.clips_dir(&user_id_str),
        &known_clips,
        exclusion,
        since,
        &mut report,
    )
    .await;
    // Legacy top-level clips directory, read-only reconciliation source.
    sweep_dir(
        &config.legacy_clips_dir(),
        &known_clips,
        exclusion,
        since,
        &mut report,
    )
    .await;

    delete_processed_audio_still_on_disk(pool, user_id, since, &mut report).await?;

    Ok(report)
}

/// Counts of what the sweep did, surfaced for logging/tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    /// Files deleted because no row referenced them.
    pub orphans_deleted: u32,
    /// Files that failed to delete (logged, not fatal).
    pub delete_failures: u32,
}

/// `since = None` collects every row; `since = Some(t)` additionally keeps
/// any row not yet marked processed, regardless of age, so an in-flight
/// segment is never mistaken for an orphan just because it is old.
async fn known_audio_paths(
    pool: &PgPool,
    user_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<HashSet<PathBuf>> {
    let rows: Vec<(String,)> = match since {
        Some(since) => {
            sqlx::query_as(
                "SELECT file_path FROM audio_segments \
                 WHERE user_id = $1 AND (processed = false OR start_utc >= $2)",
            )
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT file_path FROM audio_segments WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.into_iter().map(|(p,)| PathBuf::from(p)).collect())
}

/// Collect `clip_path`s for `user_id`, paginated in pages of
/// [`DB_PAGE_SIZE`] — never relying on an unpaged query, per the contract.
/// `since`, if set, restricts the scan to detections at or after that time.
async fn known_clip_paths(
    pool: &PgPool,
    user_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<HashSet<PathBuf>> {
    let mut known = HashSet::new();
    let mut offset: i64 = 0;
    loop {
        let rows: Vec<(String,)> = match since {
            Some(since) => {
                sqlx::query_as(
                    "SELECT clip_path FROM laughter_detections \
                     WHERE user_id = $1 AND timestamp_utc >= $2 \
                     ORDER BY id LIMIT $3 OFFSET $4",
                )
                .bind(user_id)
                .bind(since)
                .bind(DB_PAGE_SIZE)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT clip_path FROM laughter_detections WHERE user_id = $1 \
                     ORDER BY id LIMIT $2 OFFSET $3",
                )
                .bind(user_id)
                .bind(DB_PAGE_SIZE)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
        };

        let fetched = rows.len();
        known.extend(rows.into_iter().map(|(p,)| PathBuf::from(p)));
        if (fetched as i64) < DB_PAGE_SIZE {
            break;
        }
        offset += DB_PAGE_SIZE;
    }
    Ok(known)
}

/// `since`, if set, additionally requires a file to have been modified at
/// or after that time before it is deleted as an orphan — see
/// [`reconcile`]'s doc comment for why this matters under
/// [`ReconcileScope::Recent`].
async fn sweep_dir(
    dir: &Path,
    known: &HashSet<PathBuf>,
    exclusion: &HashSet<PathBuf>,
    since: Option<DateTime<Utc>>,
    report: &mut ReconcileReport,
) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if known.contains(&path) || exclusion.contains(&path) {
            continue;
        }
        if let Some(since) = since {
            let modified = entry.metadata().await.and_then(|m| m.modified());
            match modified {
                Ok(modified) if DateTime::<Utc>::from(modified) >= since => {}
                _ => continue,
            }
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                report.orphans_deleted += 1;
                debug!(path = %path.display(), "deleted orphan file");
            }
            Err(e) => {
                report.delete_failures += 1;
                warn!(path = %path.display(), error = %e, "failed to delete orphan file");
            }
        }
    }
}

/// Any DB-referenced Ogg found on disk whose segment has `processed=true`
/// must not exist (invariant 3) — delete it if it does. `since`, if set,
/// restricts the scan to segments starting at or after that time.
async fn delete_processed_audio_still_on_disk(
    pool: &PgPool,
    user_id: Uuid,
    since: Option<DateTime<Utc>>,
    report: &mut ReconcileReport,
) -> Result<()> {
    let rows: Vec<(String,)> = match since {
        Some(since) => {
            sqlx::query_as(
                "SELECT file_path FROM audio_segments \
                 WHERE user_id = $1 AND processed = true AND start_utc >= $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT file_path FROM audio_segments WHERE user_id = $1 AND processed = true",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
    };

    for (path,) in rows {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.orphans_deleted += 1,
                Err(e) => {
                    report.delete_failures += 1;
                    warn!(path, error = %e, "failed to delete processed-segment audio still on disk");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_dir_keeps_known_and_excluded_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let known_path = dir.path().join("known.wav");
        let excluded_path = dir.path().join("excluded.wav");
        let orphan_path = dir.path().join("orphan.wav");
        for p in [&known_path, &excluded_path, &orphan_path] {
            tokio::fs::write(p, b"x").await.unwrap();
        }

        let known: HashSet<PathBuf> = [known_path.clone()].into_iter().collect();
        let exclusion: HashSet<PathBuf> = [excluded_path.clone()].into_iter().collect();
        let mut report = ReconcileReport::default();

        sweep_dir(dir.path(), &known, &exclusion, None, &mut report).await;

        assert!(known_path.exists());
        assert!(excluded_path.exists());
        assert!(!orphan_path.exists());
        assert_eq!(report.orphans_deleted, 1);
    }

    #[tokio::test]
    async fn test_sweep_dir_missing_directory_is_noop() {
        let mut report = ReconcileReport::default();
        sweep_dir(
            Path::new("/does/not/exist"),
            &HashSet::new(),
            &HashSet::new(),
            None,
            &mut report,
        )
        .await;
        assert_eq!(report.orphans_deleted, 0);
        assert_eq!(report.delete_failures, 0);
    }

    #[tokio::test]
    async fn test_sweep_dir_recent_scope_spares_old_unknown_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let old_orphan = dir.path().join("old.wav");
        tokio::fs::write(&old_orphan, b"x").await.unwrap();

        let mut report = ReconcileReport::default();
        let since = Utc::now() + chrono::Duration::days(1);
        sweep_dir(dir.path(), &HashSet::new(), &HashSet::new(), Some(since), &mut report).await;

        assert!(
            old_orphan.exists(),
            "a file older than the scope's cutoff must not be deleted"
        );
        assert_eq!(report.orphans_deleted, 0);
    }
}
