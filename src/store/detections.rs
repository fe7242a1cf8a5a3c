//! C6 Detection Store & Dedup: the three-layer duplicate suppressor.
//!
//! Each layer *decides*; a single dispatcher *acts*. Keeping the decision as
//! a value (`Decision`) rather than interleaving DB calls with the
//! skip/insert logic is what makes the orphan-recovery branch (an L1 match
//! whose file is missing) explicit and unit-testable without a database.

use crate::constants::L1_DEDUP_WINDOW_SECS;
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// A candidate laughter event, ready to be stored, with its clip already
/// written to disk.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Owning user.
    pub user_id: Uuid,
    /// Segment the event was found in.
    pub segment_id: Uuid,
    /// Absolute UTC timestamp of the event.
    pub timestamp_utc: DateTime<Utc>,
    /// Classifier probability.
    pub probability: f32,
    /// Absolute path to the just-written clip.
    pub clip_path: String,
    /// Classifier class id.
    pub class_id: i32,
    /// Human-readable class name.
    pub class_name: String,
}

/// A detection row already present in the database, as seen by dedup.
#[derive(Debug, Clone, Copy)]
pub struct ExistingRow {
    /// Row id.
    pub id: Uuid,
}

/// The outcome of applying the three dedup layers to one [`Candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No conflicting row exists; insert a new one.
    Insert,
    /// A row exists whose clip file is missing; repair it in place. Counted
    /// against the matching layer's skip counter, same as [`Decision::SkipDelete`]:
    /// repairing an existing row is not a new detection, so it must not
    /// inflate `rows_inserted`.
    Update {
        /// Id of the row to update.
        existing_id: Uuid,
        /// Which layer's match triggered the repair.
        reason: SkipReason,
    },
    /// A true duplicate exists (or a DB constraint rejected the insert);
    /// delete the just-written clip and record the reason.
    SkipDelete {
        /// Why the candidate was skipped (used for counter selection).
        reason: SkipReason,
    },
    /// The clip file itself is missing at insert time; skip without
    /// touching the filesystem.
    SkipKeep {
        /// Why the candidate was skipped.
        reason: SkipReason,
    },
}

/// Which of C7's three skip counters a skip decision should increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// L1 or L3's `(user_id, timestamp_utc, class_id)` constraint.
    TimeWindow,
    /// L2's `clip_path` uniqueness.
    ClipPath,
    /// Pre-insert existence guard: the clip file vanished before insert.
    MissingFile,
}

/// Pure decision logic for L1 (time-window duplicate): given whatever L1
/// lookup found (if anything) and whether that row's clip still exists on
/// disk, decide what to do. No I/O; fully unit-testable.
#[must_use]
pub fn decide_l1(existing: Option<(ExistingRow, bool)>) -> Option<Decision> {
    existing.map(|(row, clip_exists)| {
        if clip_exists {
            Decision::SkipDelete {
                reason: SkipReason::TimeWindow,
            }
        } else {
            Decision::Update {
                existing_id: row.id,
                reason: SkipReason::TimeWindow,
            }
        }
    })
}

/// Pure decision logic for L2 (exact clip-path duplicate).
#[must_use]
pub fn decide_l2(existing: Option<(ExistingRow, bool)>) -> Option<Decision> {
    existing.map(|(row, clip_exists)| {
        if clip_exists {
            Decision::SkipDelete {
                reason: SkipReason::ClipPath,
            }
        } else {
            Decision::Update {
                existing_id: row.id,
                reason: SkipReason::ClipPath,
            }
        }
    })
}

/// Decide how to store `candidate`, running L1 then L2 DB lookups and the
/// pre-insert existence guard. L3 (the DB constraint itself) is handled by
/// [`apply_decision`], since it can only be observed at insert time.
///
/// # Errors
/// Propagates any database error encountered during the L1/L2 lookups.
pub async fn decide(pool: &PgPool, candidate: &Candidate) -> Result<Decision> {
    let half_window = TimeDelta::milliseconds((L1_DEDUP_WINDOW_SECS * 1000.0) as i64);
    let lo = candidate.timestamp_utc - half_window;
    let hi = candidate.timestamp_utc + half_window;

    let l1_row: Option<(Uuid, String)> = sqlx::query_as(
        "SELECT id, clip_path FROM laughter_detections \
         WHERE user_id = $1 AND class_id = $2 AND timestamp_utc >= $3 AND timestamp_utc <= $4 \
         LIMIT 1",
    )
    .bind(candidate.user_id)
    .bind(candidate.class_id)
    .bind(lo)
    .bind(hi)
    .fetch_optional(pool)
    .await?;

    if let Some((id, clip_path)) = l1_row {
        let clip_exists = tokio::fs::try_exists(&clip_path).await.unwrap_or(false);
        if let Some(decision) = decide_l1(Some((ExistingRow { id }, clip_exists))) {
            return Ok(decision);
        }
    }

    let l2_row: Option<(Uuid, String)> = sqlx::query_as(
        "SELECT id, clip_path FROM laughter_detections WHERE clip_path = $1 LIMIT 1",
    )
    .bind(&candidate.clip_path)
    .fetch_optional(pool)
    .await?;

    if let Some((id, clip_path)) = l2_row {
        let clip_exists = tokio::fs::try_exists(&clip_path).await.unwrap_or(false);
        if let Some(decision) = decide_l2(Some((ExistingRow { id }, clip_exists))) {
            return Ok(decision);
        }
    }

    if !tokio::fs::try_exists(&candidate.clip_path).await.unwrap_or(false) {
        return Ok(Decision::SkipKeep {
            reason: SkipReason::MissingFile,
        });
    }

    Ok(Decision::Insert)
}

/// Apply a [`Decision`]: insert, update, or delete-the-clip-and-skip.
/// Never leaves a clip file without a corresponding row.
///
/// # Errors
/// Surfaces any database error, including an L3 constraint violation not
/// already anticipated by L1/L2 (which is remapped to
/// [`SkipReason::TimeWindow`] or [`SkipReason::ClipPath`] rather than
/// propagated as a hard failure).
pub async fn apply_decision(
    pool: &PgPool,
    candidate: &Candidate,
    decision: Decision,
) -> Result<Decision> {
    match decision {
        Decision::Insert => match try_insert(pool, candidate).await {
            Ok(()) => Ok(Decision::Insert),
            Err(ConstraintViolation::TimeWindow) => {
                delete_clip(&candidate.clip_path).await;
                Ok(Decision::SkipDelete {
                    reason: SkipReason::TimeWindow,
                })
            }
            Err(ConstraintViolation::ClipPath) => {
                delete_clip(&candidate.clip_path).await;
                Ok(Decision::SkipDelete {
                    reason: SkipReason::ClipPath,
                })
            }
            Err(ConstraintViolation::Other(e)) => {
                delete_clip(&candidate.clip_path).await;
                Err(e)
            }
        },
        Decision::Update { existing_id, reason } => {
            sqlx::query(
                "UPDATE laughter_detections SET clip_path = $1, probability = $2 WHERE id = $3",
            )
            .bind(&candidate.clip_path)
            .bind(candidate.probability)
            .bind(existing_id)
            .execute(pool)
            .await?;
            Ok(Decision::Update { existing_id, reason })
        }
        skip @ (Decision::SkipDelete { .. } | Decision::SkipKeep { .. }) => {
            if matches!(skip, Decision::SkipDelete { .. }) {
                delete_clip(&candidate.clip_path).await;
            }
            Ok(skip)
        }
    }
}

async fn delete_clip(path: &str) {
    let _ = tokio::fs::remove_file(path).await;
}

enum ConstraintViolation {
    TimeWindow,
    ClipPath,
    Other(crate::Error),
}

async fn try_insert(pool: &PgPool, candidate: &Candidate) -> std::result::Result<(), ConstraintViolation> {
    let result = sqlx::query(
        "INSERT INTO laughter_detections \
         (user_id, segment_id, timestamp_utc, probability, clip_path, class_id, class_name) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(candidate.user_id)
    .bind(candidate.segment_id)
    .bind(candidate.timestamp_utc)
    .bind(candidate.probability)
    .bind(&candidate.clip_path)
    .bind(candidate.class_id)
    .bind(&candidate.class_name)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("clip_path") {
                Err(ConstraintViolation::ClipPath)
            } else {
                Err(ConstraintViolation::TimeWindow)
            }
        }
        Err(e) => Err(ConstraintViolation::Other(e.into())),
    }
}
