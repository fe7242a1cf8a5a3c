//! C3 Segment Store: persist/query audio-segment metadata.

use super::models::AudioSegment;
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Returns true iff any segment for `user_id` with `processed=true`
/// overlaps `[start, end)` under the uniform range-overlap predicate
/// (see [`crate::time_chunker::ranges_overlap`]).
///
/// This is the pre-download gate C8 calls before invoking C2, saving
/// bandwidth on chunks already covered by a prior run.
pub async fn already_overlaps_processed(
    pool: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM audio_segments \
         WHERE user_id = $1 AND processed = true AND start_utc < $3 AND end_utc > $2 \
         LIMIT 1",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Write `bytes` to `uploads/audio/{user_id}/{start}-{end}.ogg` and insert
/// the corresponding row. Returns the new segment's id and the path the
/// blob was written to, so the caller can decode it without a second query.
pub async fn insert(
    pool: &PgPool,
    user_id: Uuid,
    date_local: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    audio_dir: &Path,
    bytes: &[u8],
) -> Result<(Uuid, PathBuf)> {
    tokio::fs::create_dir_all(audio_dir)
        .await
        .map_err(crate::Error::Io)?;

    let file_name = format!(
        "{}-{}.ogg",
        start.format("%Y%m%d_%H%M%S"),
        end.format("%Y%m%d_%H%M%S")
    );
    let file_path: PathBuf = audio_dir.join(file_name);
    tokio::fs::write(&file_path, bytes)
        .await
        .map_err(crate::Error::Io)?;

    let id: (Uuid,) = sqlx::query_as(
        "INSERT INTO audio_segments (user_id, date_local, start_utc, end_utc, file_path, processed) \
         VALUES ($1, $2, $3, $4, $5, false) RETURNING id",
    )
    .bind(user_id)
    .bind(date_local)
    .bind(start)
    .bind(end)
    .bind(file_path.to_string_lossy().into_owned())
    .fetch_one(pool)
    .await?;

    Ok((id.0, file_path))
}

/// Mark a segment as processed. The on-disk file is removed separately
/// by [`delete_file`] (kept as two steps so a crash between them leaves
/// the segment row, not the file, as the source of truth).
pub async fn mark_processed(pool: &PgPool, segment_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE audio_segments SET processed = true WHERE id = $1")
        .bind(segment_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete the on-disk audio blob for a segment. Missing files are not an error.
pub async fn delete_file(pool: &PgPool, segment_id: Uuid) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT file_path FROM audio_segments WHERE id = $1")
        .bind(segment_id)
        .fetch_optional(pool)
        .await?;
    if let Some((path,)) = row {
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) => {}
        }
    }
    Ok(())
}

/// Latest `end_utc` among today's segments for `user_id`, if any exist.
///
/// Supports the "update today" resume-point rule: the next run should not
/// re-fetch a window already covered.
pub async fn latest_end_for_today(
    pool: &PgPool,
    user_id: Uuid,
    start_of_day: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "SELECT MAX(end_utc) FROM audio_segments WHERE user_id = $1 AND start_utc >= $2",
    )
    .bind(user_id)
    .bind(start_of_day)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(t,)| t).filter(|t| *t > start_of_day))
}

/// All on-disk audio file paths known to the DB for `user_id`. Feeds C10's
/// `known_audio` set.
pub async fn list_file_paths(pool: &PgPool, user_id: Uuid) -> Result<Vec<PathBuf>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT file_path FROM audio_segments WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(p,)| PathBuf::from(p)).collect())
}

/// Delete every segment (and its cascade-deleted detections) for `user_id`
/// whose `start_utc` falls within `[from, to)`, used by the reprocess path.
///
/// Files are deleted first — both the segment's audio blob and every
/// detection clip in range — and only then are the DB rows removed, so a
/// crash partway through never leaves an orphaned file with no DB record to
/// reconcile it against. Returns the segment rows that were deleted.
pub async fn delete_range(
    pool: &PgPool,
    user_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<AudioSegment>> {
    let segments = sqlx::query_as::<_, AudioSegment>(
        "SELECT id, user_id, date_local, start_utc, end_utc, file_path, processed \
         FROM audio_segments WHERE user_id = $1 AND start_utc >= $2 AND start_utc < $3",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let clip_paths: Vec<(String,)> = sqlx::query_as(
        "SELECT d.clip_path FROM laughter_detections d \
         JOIN audio_segments s ON s.id = d.segment_id \
         WHERE s.user_id = $1 AND s.start_utc >= $2 AND s.start_utc < $3",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    for segment in &segments {
        let _ = tokio::fs::remove_file(&segment.file_path).await;
    }
    for (clip_path,) in &clip_paths {
        let _ = tokio::fs::remove_file(clip_path).await;
    }

    sqlx::query("DELETE FROM audio_segments WHERE user_id = $1 AND start_utc >= $2 AND start_utc < $3")
        .bind(user_id)
        .bind(from)
        .bind(to)
        .execute(pool)
        .await?;

    Ok(segments)
}
