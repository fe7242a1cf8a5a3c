//! C8 Per-User Pipeline: the iteration loop that turns one UTC time window
//! into persisted detections for one user.

use crate::classifier::{self, LaughterClassifier};
use crate::clipper::ClipWriter;
use crate::config::Config;
use crate::crypto;
use crate::error::{Error, Result};
use crate::locking::FileLock;
use crate::reconciler::{self, ReconcileScope};
use crate::store::{self, Candidate, Decision, RunCounters, RunStatus, SkipReason, Trigger, User};
use crate::time_chunker;
use crate::upstream::{FatalReason, Outcome, UpstreamClient};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Run the pipeline for `user` over `[window.0, window.1)`, under lock
/// `mode` (also the processing-log's implicit run kind via `trigger`),
/// upserting one `processing_logs` row keyed by `date_local`.
///
/// # Errors
/// Returns [`Error::AlreadyRunning`] if another run already holds this
/// user's `(user_id, mode)` lock. Returns [`Error::NoActiveCredential`] if
/// the user has no active upstream credential. Any other error aborts the
/// run as `RunStatus::Failed`, with the failure recorded in the upserted
/// log row before the error is propagated.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    pool: &PgPool,
    config: &Config,
    classifier: Arc<dyn LaughterClassifier>,
    user: &User,
    mode: &str,
    trigger: Trigger,
    date_local: NaiveDate,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Result<RunCounters> {
    let user_id_str = user.id.to_string();
    let lock = match FileLock::acquire(&config.upload_dir, &user_id_str, mode) {
        Ok(lock) => lock,
        Err(e) => {
            let _ = store::upsert_processing_log(
                pool,
                user.id,
                date_local,
                trigger,
                RunStatus::Failed,
                0.0,
                &RunCounters::default(),
                serde_json::json!({ "error": e.to_string() }),
            )
            .await;
            return Err(e);
        }
    };

    let started = Instant::now();
    match run_locked(pool, config, classifier, user, date_local, window).await {
        Ok(counters) => {
            store::upsert_processing_log(
                pool,
                user.id,
                date_local,
                trigger,
                RunStatus::Completed,
                started.elapsed().as_secs_f64(),
                &counters,
                serde_json::Value::Null,
            )
            .await?;
            drop(lock);
            Ok(counters)
        }
        Err((counters, e)) => {
            let _ = store::upsert_processing_log(
                pool,
                user.id,
                date_local,
                trigger,
                RunStatus::Failed,
                started.elapsed().as_secs_f64(),
                &counters,
                serde_json::json!({ "error": e.to_string() }),
            )
            .await;
            drop(lock);
            Err(e)
        }
    }
}

/// The body of the run, once the per-user lock is held. Returns the
/// counters alongside any error so the caller can still log partial
/// progress for a run that aborted partway through.
async fn run_locked(
    pool: &PgPool,
    config: &Config,
    classifier: Arc<dyn LaughterClassifier>,
    user: &User,
    date_local: NaiveDate,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> std::result::Result<RunCounters, (RunCounters, Error)> {
    let mut counters = RunCounters::default();
    let mut exclusion: HashSet<PathBuf> = HashSet::new();

    let credential = match store::active_credential(pool, user.id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return Err((
                counters,
                Error::NoActiveCredential {
                    user_id: user.id.to_string(),
                },
            ));
        }
        Err(e) => return Err((counters, e)),
    };
    let user_id_str = user.id.to_string();
    let secret = match crypto::decrypt(
        &config.encryption_key,
        &credential.encrypted_secret,
        &user_id_str,
    ) {
        Ok(s) => s,
        Err(e) => return Err((counters, e)),
    };

    let recent = ReconcileScope::Recent {
        since: Utc::now() - TimeDelta::days(2),
    };
    if let Err(e) = reconciler::reconcile(pool, config, user.id, &exclusion, recent).await {
        warn!(user_id = %user.id, error = %e, "pre-flight reconciliation failed, continuing run");
    }

    let client = UpstreamClient::new(config.upstream_base_url.clone());
    let audio_dir = config.audio_dir(&user_id_str);
    let clips_dir = config.clips_dir(&user_id_str);
    let writer = ClipWriter::new(clips_dir);

    let chunks = time_chunker::chunks(window.0, window.1, config.chunk_minutes);

    for chunk in chunks {
        match store::already_overlaps_processed(pool, user.id, chunk.start, chunk.end).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => return Err((counters, e)),
        }

        let (outcome, api_call) = match client.fetch(&secret, chunk.start, chunk.end).await {
            Ok(pair) => pair,
            Err(e) => return Err((counters, e)),
        };
        counters.api_calls.push(api_call);

        let bytes = match outcome {
            Outcome::Blob { bytes } => bytes,
            Outcome::NoData | Outcome::Transient => continue,
            Outcome::Fatal(reason) => {
                let err = match reason {
                    FatalReason::InvalidCredential => Error::InvalidCredential,
                    FatalReason::RateLimited => Error::RateLimited,
                    FatalReason::Upstream(status) => Error::UpstreamError { status },
                };
                return Err((counters, err));
            }
        };

        counters.files_downloaded += 1;

        let (segment_id, file_path) = match store::insert(
            pool,
            user.id,
            date_local,
            chunk.start,
            chunk.end,
            &audio_dir,
            &bytes,
        )
        .await
        {
            Ok(pair) => pair,
            Err(e) => return Err((counters, e)),
        };

        let samples = match decode_and_resample(file_path.clone()).await {
            Ok(s) => s,
            Err(e) => return Err((counters, e)),
        };

        let events = match run_classifier(
            classifier.clone(),
            samples.clone(),
            config.laughter_threshold,
        )
        .await
        {
            Ok(events) => events,
            Err(e) => return Err((counters, e)),
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            counters.events_found += events.len() as i32;
        }

        let segment_stem = file_path
            .file_stem()
            .map_or_else(|| segment_id.to_string(), |s| s.to_string_lossy().into_owned());

        for event in &events {
            let clip_path = match writer
                .write(
                    &segment_stem,
                    &samples,
                    crate::constants::CLASSIFIER_SAMPLE_RATE,
                    event,
                )
                .await
            {
                Ok(p) => p,
                Err(e) => return Err((counters, e)),
            };

            let offset_ms = (event.timestamp_rel_s * 1000.0) as i64;
            let timestamp_utc = chunk.start + TimeDelta::milliseconds(offset_ms);

            #[allow(clippy::cast_possible_wrap)]
            let candidate = Candidate {
                user_id: user.id,
                segment_id,
                timestamp_utc,
                probability: event.probability,
                clip_path: clip_path.to_string_lossy().into_owned(),
                class_id: event.class_id as i32,
                class_name: event.class_name.to_string(),
            };

            let decision = match store::decide(pool, &candidate).await {
                Ok(d) => d,
                Err(e) => return Err((counters, e)),
            };
            let decision = match store::apply_decision(pool, &candidate, decision).await {
                Ok(d) => d,
                Err(e) => return Err((counters, e)),
            };

            match decision {
                Decision::Insert => {
                    exclusion.insert(PathBuf::from(&candidate.clip_path));
                }
                Decision::Update { reason, .. } => {
                    exclusion.insert(PathBuf::from(&candidate.clip_path));
                    increment_skip_counter(&mut counters, reason);
                }
                Decision::SkipDelete { reason } | Decision::SkipKeep { reason } => {
                    increment_skip_counter(&mut counters, reason);
                }
            }
        }

        if let Err(e) = store::mark_processed(pool, segment_id).await {
            return Err((counters, e));
        }
        if let Err(e) = store::delete_file(pool, segment_id).await {
            return Err((counters, e));
        }
        counters.last_processed_utc = Some(chunk.end);
    }

    if let Err(e) = reconciler::reconcile(pool, config, user.id, &exclusion, recent).await {
        warn!(user_id = %user.id, error = %e, "post-flight reconciliation failed");
    }

    info!(
        user_id = %user.id,
        files_downloaded = counters.files_downloaded,
        events_found = counters.events_found,
        rows_inserted = counters.rows_inserted(),
        "run complete"
    );

    Ok(counters)
}

/// Account a skip (or repair-in-place) decision against its matching C7
/// counter. An [`Decision::Update`] counts here too: it repairs an existing
/// row rather than adding a new one, so it must not inflate `rows_inserted`.
fn increment_skip_counter(counters: &mut RunCounters, reason: SkipReason) {
    match reason {
        SkipReason::TimeWindow => counters.skipped_time_window += 1,
        SkipReason::ClipPath => counters.skipped_clip_path += 1,
        SkipReason::MissingFile => counters.skipped_missing_file += 1,
    }
}

/// Decode the segment blob and resample it to the classifier's expected
/// sample rate, off the async executor thread (symphonia and `rubato` are
/// both synchronous, CPU-bound libraries).
async fn decode_and_resample(path: PathBuf) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || {
        let decoded = crate::audio::decode_audio_file(&path)?;
        if decoded.sample_rate == crate::constants::CLASSIFIER_SAMPLE_RATE {
            Ok(decoded.samples)
        } else {
            crate::audio::resample(
                decoded.samples,
                decoded.sample_rate,
                crate::constants::CLASSIFIER_SAMPLE_RATE,
            )
        }
    })
    .await
    .map_err(|e| Error::Internal {
        message: format!("decode/resample task panicked: {e}"),
    })?
}

/// Run inference off the async executor thread; `ort` sessions do not yield.
async fn run_classifier(
    classifier: Arc<dyn LaughterClassifier>,
    samples: Vec<f32>,
    threshold: f32,
) -> Result<Vec<classifier::Event>> {
    tokio::task::spawn_blocking(move || classifier::detect_events(classifier.as_ref(), &samples, threshold))
        .await
        .map_err(|e| Error::Inference {
            reason: format!("inference task panicked: {e}"),
        })?
}
