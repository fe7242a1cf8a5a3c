//! C7 Processing Logger: per-run counters, upserted one row per `(user, date)`.

use super::models::{ApiCallRecord, RunStatus, Trigger};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Mutable counters accumulated over one run. Built up in-process and
/// upserted once at the end (and once more on fatal error).
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    /// Chunks for which a blob was actually downloaded.
    pub files_downloaded: i32,
    /// Total above-threshold patches seen, before dedup.
    pub events_found: i32,
    /// L1 time-window skips.
    pub skipped_time_window: i32,
    /// L2 clip-path skips.
    pub skipped_clip_path: i32,
    /// Pre-insert missing-file skips.
    pub skipped_missing_file: i32,
    /// One entry per upstream HTTP call made this run.
    pub api_calls: Vec<ApiCallRecord>,
    /// Most recent `end_utc` among segments this run touched.
    pub last_processed_utc: Option<DateTime<Utc>>,
}

impl RunCounters {
    /// `skipped_time_window + skipped_clip_path + skipped_missing_file`.
    #[must_use]
    pub fn duplicates_skipped(&self) -> i32 {
        self.skipped_time_window + self.skipped_clip_path + self.skipped_missing_file
    }

    /// Detections actually inserted this run: `events_found - duplicates_skipped`.
    ///
    /// This is the accounting identity the test suite checks directly
    /// against the number of rows a run produced.
    #[must_use]
    pub fn rows_inserted(&self) -> i32 {
        self.events_found - self.duplicates_skipped()
    }
}

/// Upsert one `processing_logs` row keyed by `(user_id, date_local)`.
/// Re-runs for the same day overwrite the previous counters.
pub async fn upsert(
    pool: &PgPool,
    user_id: Uuid,
    date_local: NaiveDate,
    trigger: Trigger,
    status: RunStatus,
    duration_s: f64,
    counters: &RunCounters,
    error_details: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO processing_logs \
         (user_id, date_local, trigger, status, duration_s, files_downloaded, events_found, \
          duplicates_skipped, api_calls, error_details, last_processed_utc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (user_id, date_local) DO UPDATE SET \
           trigger = EXCLUDED.trigger, \
           status = EXCLUDED.status, \
           duration_s = EXCLUDED.duration_s, \
           files_downloaded = EXCLUDED.files_downloaded, \
           events_found = EXCLUDED.events_found, \
           duplicates_skipped = EXCLUDED.duplicates_skipped, \
           api_calls = EXCLUDED.api_calls, \
           error_details = EXCLUDED.error_details, \
           last_processed_utc = EXCLUDED.last_processed_utc",
    )
    .bind(user_id)
    .bind(date_local)
    .bind(trigger)
    .bind(status)
    .bind(duration_s)
    .bind(counters.files_downloaded)
    .bind(counters.events_found)
    .bind(counters.duplicates_skipped())
    .bind(Json(&counters.api_calls))
    .bind(Json(error_details))
    .bind(counters.last_processed_utc)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_skipped_sums_three_counters() {
        let counters = RunCounters {
            skipped_time_window: 2,
            skipped_clip_path: 1,
            skipped_missing_file: 1,
            ..Default::default()
        };
        assert_eq!(counters.duplicates_skipped(), 4);
    }

    #[test]
    fn test_accounting_identity() {
        let counters = RunCounters {
            events_found: 10,
            skipped_time_window: 3,
            skipped_clip_path: 1,
            skipped_missing_file: 0,
            ..Default::default()
        };
        assert_eq!(counters.rows_inserted(), 6);
    }
}
