//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used in lock files and user-facing messages.
pub const APP_NAME: &str = "laughter-pipeline";

/// Lock file extension.
pub const LOCK_FILE_EXTENSION: &str = ".laughter-pipeline.lock";

/// Default laughter-probability threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Default clip duration in seconds (2s before + 2s after the event).
pub const DEFAULT_CLIP_DURATION: f32 = 4.0;

/// Half the default clip duration; how far before/after the event timestamp a clip extends.
pub const DEFAULT_CLIP_HALF_WINDOW: f32 = 2.0;

/// Default chunk size for the time chunker, in minutes.
pub const DEFAULT_CHUNK_MINUTES: i64 = 30;

/// Maximum span, in seconds, the upstream service accepts for a single request.
pub const UPSTREAM_MAX_WINDOW_SECS: i64 = 2 * 3600;

/// Sample rate the classifier expects, in Hz.
pub const CLASSIFIER_SAMPLE_RATE: u32 = 16_000;

/// Patch length the classifier analyzes at a time, in seconds.
pub const PATCH_DURATION_SECS: f32 = 0.96;

/// Hop between successive patches, in seconds.
pub const PATCH_HOP_SECS: f32 = 0.48;

/// Half-width, in seconds, of the time-window duplicate check (so the full
/// window is `2 * L1_DEDUP_WINDOW_SECS` wide, closed on both ends).
pub const L1_DEDUP_WINDOW_SECS: f64 = 5.0;

/// Class ids the classifier's label set assigns to laughter-family sounds,
/// paired with their human-readable names.
pub const LAUGHTER_CLASSES: [(u32, &str); 5] = [
    (13, "Laughter"),
    (14, "Baby laughter"),
    (15, "Giggle"),
    (17, "Belly laugh"),
    (18, "Chuckle"),
];

/// Page size used for paginated detection/segment queries (orphan reconciliation).
pub const DB_PAGE_SIZE: i64 = 1000;

/// Default upload directory, relative to the current working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
