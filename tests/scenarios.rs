//! End-to-end scenario tests driving the real pipeline against an ephemeral
//! Postgres database (via `sqlx::test`) and a mocked upstream service (via
//! `wiremock`). Each test mirrors one of the canonical run scenarios the
//! dedup/accounting invariants were designed against.

use chrono::{TimeDelta, TimeZone, Utc};
use laughter_pipeline::classifier::{FakeClassifier, LaughterClassifier};
use laughter_pipeline::config::Config;
use laughter_pipeline::crypto;
use laughter_pipeline::pipeline;
use laughter_pipeline::store::{self, Candidate, Decision, SkipReason, Trigger, User};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: [u8; 32] = [42u8; 32];

fn test_config(upload_dir: PathBuf, base_url: String, chunk_minutes: i64) -> Config {
    Config {
        upstream_base_url: base_url,
        db_url: String::new(),
        service_key: String::new(),
        encryption_key: KEY,
        upload_dir,
        laughter_threshold: 0.3,
        clip_duration_secs: 4.0,
        chunk_minutes,
        nightly_utc: (9, 0),
        verbose_logs: false,
        model_path: PathBuf::from("model.onnx"),
    }
}

async fn setup_user(pool: &PgPool, tz: &str) -> User {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO users (email, timezone) VALUES ($1, $2) RETURNING id",
    )
    .bind(format!("{}@example.test", Uuid::new_v4()))
    .bind(tz)
    .fetch_one(pool)
    .await
    .unwrap();

    let encrypted = crypto::encrypt(&KEY, "upstream-secret-token", &id.to_string()).unwrap();
    sqlx::query("INSERT INTO upstream_keys (user_id, encrypted_secret) VALUES ($1, $2)")
        .bind(id)
        .bind(&encrypted)
        .execute(pool)
        .await
        .unwrap();

    User {
        id,
        email: String::new(),
        timezone: tz.to_string(),
        is_active: true,
    }
}

fn make_wav_bytes(num_samples: usize, sample_rate: u32) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..num_samples {
            #[allow(clippy::cast_precision_loss)]
            writer.write_sample((i as f32 * 0.001).sin()).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

async fn detection_count(pool: &PgPool, user_id: Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM laughter_detections WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

async fn segment_count(pool: &PgPool, user_id: Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM audio_segments WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

/// S1: a clean day with two above-threshold patches in two separate chunks
/// produces two detections, two downloaded files, and zero duplicates.
#[sqlx::test]
async fn test_s1_clean_day_produces_two_detections(pool: PgPool) {
    let mock_server = MockServer::start().await;
    let wav = make_wav_bytes(16_000, 16_000);

    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav))
        .expect(2)
        .mount(&mock_server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let config = test_config(upload_dir.path().to_path_buf(), mock_server.uri(), 30);
    let user = setup_user(&pool, "UTC").await;
    let classifier: Arc<dyn LaughterClassifier> =
        Arc::new(FakeClassifier::with_patch(0, vec![(13, 0.9)]));

    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let end = start + TimeDelta::hours(1);

    let counters = pipeline::run(
        &pool,
        &config,
        classifier,
        &user,
        "run-nightly",
        Trigger::Cron,
        start.date_naive(),
        (start, end),
    )
    .await
    .unwrap();

    assert_eq!(counters.files_downloaded, 2);
    assert_eq!(counters.events_found, 2);
    assert_eq!(counters.duplicates_skipped(), 0);
    assert_eq!(counters.rows_inserted(), 2);
    assert_eq!(detection_count(&pool, user.id).await, 2);
    assert_eq!(segment_count(&pool, user.id).await, 2);
}

/// S2: re-running the exact same window a second time hits the pre-download
/// overlap gate on every chunk, downloads nothing, and leaves a single
/// upserted log row rather than a duplicate one.
#[sqlx::test]
async fn test_s2_overlap_rerun_downloads_nothing(pool: PgPool) {
    let mock_server = MockServer::start().await;
    let wav = make_wav_bytes(16_000, 16_000);

    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let config = test_config(upload_dir.path().to_path_buf(), mock_server.uri(), 60);
    let user = setup_user(&pool, "UTC").await;
    let classifier: Arc<dyn LaughterClassifier> =
        Arc::new(FakeClassifier::with_patch(0, vec![(13, 0.9)]));

    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let end = start + TimeDelta::hours(1);
    let date_local = start.date_naive();

    let first = pipeline::run(
        &pool,
        &config,
        Arc::clone(&classifier),
        &user,
        "run-nightly",
        Trigger::Cron,
        date_local,
        (start, end),
    )
    .await
    .unwrap();
    assert_eq!(first.files_downloaded, 1);

    let second = pipeline::run(
        &pool,
        &config,
        classifier,
        &user,
        "run-nightly",
        Trigger::Cron,
        date_local,
        (start, end),
    )
    .await
    .unwrap();

    assert_eq!(second.files_downloaded, 0);
    assert_eq!(detection_count(&pool, user.id).await, 1);

    let (log_rows,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM processing_logs WHERE user_id = $1 AND date_local = $2",
    )
    .bind(user.id)
    .bind(date_local)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(log_rows, 1, "re-run must upsert, not duplicate, the log row");
}

/// S3: a detection row whose clip file was lost from disk is repaired in
/// place (not re-inserted) the next time the same event is decided. No
/// detection row is ever left pointing at a file that doesn't exist.
#[sqlx::test]
async fn test_s3_orphan_recovery_updates_in_place(pool: PgPool) {
    let upload_dir = TempDir::new().unwrap();
    let audio_dir = upload_dir.path().join("audio");
    let clips_dir = upload_dir.path().join("clips");
    let user = setup_user(&pool, "UTC").await;

    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let end = start + TimeDelta::minutes(30);
    let (segment_id, _file_path) = store::insert(
        &pool,
        user.id,
        start.date_naive(),
        start,
        end,
        &audio_dir,
        b"fake-ogg-bytes",
    )
    .await
    .unwrap();

    let timestamp_utc = start + TimeDelta::seconds(5);
    let old_clip_path = clips_dir.join("old_clip_13.wav");
    tokio::fs::create_dir_all(&clips_dir).await.unwrap();
    tokio::fs::write(&old_clip_path, b"wav-bytes").await.unwrap();

    let old_candidate = Candidate {
        user_id: user.id,
        segment_id,
        timestamp_utc,
        probability: 0.7,
        clip_path: old_clip_path.to_string_lossy().into_owned(),
        class_id: 13,
        class_name: "Laughter".to_string(),
    };
    let decision = store::decide(&pool, &old_candidate).await.unwrap();
    assert_eq!(decision, Decision::Insert);
    store::apply_decision(&pool, &old_candidate, decision)
        .await
        .unwrap();
    assert_eq!(detection_count(&pool, user.id).await, 1);

    let (existing_id,): (Uuid,) =
        sqlx::query_as("SELECT id FROM laughter_detections WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();

    // Simulate the clip vanishing from disk (e.g. a prior crash mid-write,
    // or external disk cleanup) before the same event is reprocessed.
    tokio::fs::remove_file(&old_clip_path).await.unwrap();

    let new_clip_path = clips_dir.join("new_clip_13.wav");
    tokio::fs::write(&new_clip_path, b"wav-bytes-2").await.unwrap();
    let new_candidate = Candidate {
        user_id: user.id,
        segment_id,
        timestamp_utc,
        probability: 0.95,
        clip_path: new_clip_path.to_string_lossy().into_owned(),
        class_id: 13,
        class_name: "Laughter".to_string(),
    };

    let decision = store::decide(&pool, &new_candidate).await.unwrap();
    assert_eq!(
        decision,
        Decision::Update {
            existing_id,
            reason: SkipReason::TimeWindow,
        }
    );
    store::apply_decision(&pool, &new_candidate, decision)
        .await
        .unwrap();

    // Invariant 2: no dangling row without a file, and never two rows for
    // one logical event.
    assert_eq!(detection_count(&pool, user.id).await, 1);
    let (clip_path, probability): (String, f32) = sqlx::query_as(
        "SELECT clip_path, probability FROM laughter_detections WHERE user_id = $1",
    )
    .bind(user.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(clip_path, new_clip_path.to_string_lossy());
    assert!((probability - 0.95).abs() < f32::EPSILON);
    assert!(tokio::fs::try_exists(&new_clip_path).await.unwrap());
}

/// S4: one transient 5xx among several chunks is skipped, not fatal; the
/// run completes with every other chunk downloaded and the failed call
/// recorded in the log's `api_calls` history.
#[sqlx::test]
async fn test_s4_transient_upstream_error_is_skipped_not_fatal(pool: PgPool) {
    let mock_server = MockServer::start().await;
    let wav = make_wav_bytes(16_000, 16_000);

    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let transient_chunk_start = start + TimeDelta::minutes(30);

    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .and(query_param(
            "startMs",
            transient_chunk_start.timestamp_millis().to_string(),
        ))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav))
        .with_priority(5)
        .mount(&mock_server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let config = test_config(upload_dir.path().to_path_buf(), mock_server.uri(), 30);
    let user = setup_user(&pool, "UTC").await;
    let classifier: Arc<dyn LaughterClassifier> = Arc::new(FakeClassifier::default());

    let end = start + TimeDelta::hours(2);
    let counters = pipeline::run(
        &pool,
        &config,
        classifier,
        &user,
        "run-nightly",
        Trigger::Cron,
        start.date_naive(),
        (start, end),
    )
    .await
    .unwrap();

    assert_eq!(counters.files_downloaded, 3, "one of four chunks was skipped");
    assert_eq!(counters.api_calls.len(), 4);
    assert_eq!(
        counters.api_calls.iter().filter(|c| c.status == Some(503)).count(),
        1
    );

    let (status,): (String,) = sqlx::query_as(
        "SELECT status FROM processing_logs WHERE user_id = $1 AND date_local = $2",
    )
    .bind(user.id)
    .bind(start.date_naive())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "completed");
}

/// S5: an invalid credential is fatal. The run aborts, no segment or clip
/// is ever written, and the failure is recorded on the log row.
#[sqlx::test]
async fn test_s5_fatal_credential_aborts_the_run(pool: PgPool) {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let config = test_config(upload_dir.path().to_path_buf(), mock_server.uri(), 30);
    let user = setup_user(&pool, "UTC").await;
    let classifier: Arc<dyn LaughterClassifier> = Arc::new(FakeClassifier::default());

    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let end = start + TimeDelta::minutes(30);

    let result = pipeline::run(
        &pool,
        &config,
        classifier,
        &user,
        "run-nightly",
        Trigger::Cron,
        start.date_naive(),
        (start, end),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(segment_count(&pool, user.id).await, 0);
    assert_eq!(detection_count(&pool, user.id).await, 0);

    let (status, error_details): (String, serde_json::Value) = sqlx::query_as(
        "SELECT status, error_details FROM processing_logs WHERE user_id = $1 AND date_local = $2",
    )
    .bind(user.id)
    .bind(start.date_naive())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "failed");
    assert!(!error_details.is_null());
}

/// S6: reprocessing across a DST fall-back boundary writes one
/// `ProcessingLog` row per local date, with the fall-back day correctly
/// sized at 25 hours (and the other at 24), summing to 49 hours of
/// UTC coverage.
#[sqlx::test]
async fn test_s6_reprocess_across_dst_fallback_writes_two_daily_logs(pool: PgPool) {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/download-audio"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let config = test_config(upload_dir.path().to_path_buf(), mock_server.uri(), 60);
    let user = setup_user(&pool, "America/Los_Angeles").await;
    let classifier: Arc<dyn LaughterClassifier> = Arc::new(FakeClassifier::default());

    let tz = pipeline::parse_timezone(&user.timezone).unwrap();
    let from = chrono::NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
    let to = chrono::NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
    let windows = pipeline::reprocess_windows(tz, from, to);
    assert_eq!(windows.len(), 2);

    for window in &windows {
        pipeline::run(
            &pool,
            &config,
            Arc::clone(&classifier),
            &user,
            "reprocess",
            Trigger::Manual,
            window.date_local,
            (window.start, window.end),
        )
        .await
        .unwrap();
    }

    let (log_rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM processing_logs WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(log_rows, 2);

    let total_hours: i64 = windows.iter().map(|w| (w.end - w.start).num_hours()).sum();
    assert_eq!(total_hours, 49, "a fall-back pair is always 24h + 25h");
}
