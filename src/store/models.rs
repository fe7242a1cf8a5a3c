//! Row types for the Postgres schema, mirroring `migrations/`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant of the pipeline.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Primary key.
    pub id: Uuid,
    /// Login email.
    pub email: String,
    /// IANA timezone name, e.g. `America/Los_Angeles`.
    pub timezone: String,
    /// Whether the account is enabled for processing.
    pub is_active: bool,
}

/// An upstream wearable-service credential.
#[derive(Debug, Clone, FromRow)]
pub struct UpstreamCredential {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// AES-256-GCM ciphertext, see [`crate::crypto`].
    pub encrypted_secret: String,
    /// At most one row per user may have this set.
    pub is_active: bool,
}

/// One fetched audio blob covering a sub-window.
#[derive(Debug, Clone, FromRow)]
pub struct AudioSegment {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Local-timezone date this segment's `start_utc` falls on.
    pub date_local: NaiveDate,
    /// Inclusive start of the fetched window.
    pub start_utc: DateTime<Utc>,
    /// Exclusive end of the fetched window.
    pub end_utc: DateTime<Utc>,
    /// Absolute path to the on-disk Ogg/Opus blob.
    pub file_path: String,
    /// Set once the classifier has finished with this segment.
    pub processed: bool,
}

/// A persisted laughter event.
#[derive(Debug, Clone, FromRow)]
pub struct LaughterDetection {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Segment this detection was found in.
    pub segment_id: Uuid,
    /// Absolute UTC timestamp of the event.
    pub timestamp_utc: DateTime<Utc>,
    /// Classifier probability at detection time.
    pub probability: f32,
    /// Absolute path to the clip WAV.
    pub clip_path: String,
    /// Classifier class id.
    pub class_id: i32,
    /// Human-readable class name.
    pub class_name: String,
    /// Free-text annotation, unused by the pipeline itself.
    pub notes: Option<String>,
}

/// Trigger that started a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Trigger {
    /// Started by an operator via the CLI.
    Manual,
    /// Started via `update-today` while a user actively uses the product.
    Scheduled,
    /// Started by the nightly fleet run.
    Cron,
}

/// Outcome of a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RunStatus {
    /// Run has been created but has not finished.
    Pending,
    /// Run finished without a fatal error (may still have skipped chunks).
    Completed,
    /// Run aborted due to a fatal error.
    Failed,
}

/// Record of one upstream HTTP call, stored as a JSON array element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    /// Request path, without host.
    pub endpoint: String,
    /// HTTP status code, if a response was received.
    pub status: Option<u16>,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// Size of the response body in bytes, if known.
    pub response_size: Option<u64>,
    /// Query parameters sent (`startMs`/`endMs`).
    pub params: serde_json::Value,
    /// Error description, if the call failed.
    pub error: Option<String>,
}

/// A daily per-user run summary.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessingLog {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Local-timezone date this log summarizes.
    pub date_local: NaiveDate,
    /// What kind of run produced this row.
    pub trigger: Trigger,
    /// Current run status.
    pub status: RunStatus,
    /// Wall-clock run duration in seconds.
    pub duration_s: f64,
    /// Chunks for which a blob was actually downloaded.
    pub files_downloaded: i32,
    /// Total above-threshold patches seen, before dedup.
    pub events_found: i32,
    /// `skipped_time_window + skipped_clip_path + skipped_missing_file`.
    pub duplicates_skipped: i32,
    /// Per-layer skip counters and upstream call log, as JSON.
    pub api_calls: sqlx::types::Json<Vec<ApiCallRecord>>,
    /// Structured error context, present only when `status=failed`.
    pub error_details: sqlx::types::Json<serde_json::Value>,
    /// The latest `end_utc` of any segment processed in this run.
    pub last_processed_utc: Option<DateTime<Utc>>,
}
