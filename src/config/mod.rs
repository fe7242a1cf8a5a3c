//! Environment-based configuration loading and validation.
//!
//! Unlike a desktop CLI tool reading a TOML file, this pipeline runs as a
//! long-lived batch/cron process and takes all of its configuration from the
//! environment, per the external-interfaces contract. `Config::from_env`
//! is the single entry point; every other module receives an already-parsed
//! `Config` rather than reading the environment itself.

use crate::constants::{
    DEFAULT_CHUNK_MINUTES, DEFAULT_CLIP_DURATION, DEFAULT_THRESHOLD, DEFAULT_UPLOAD_DIR,
};
use crate::error::{Error, Result};
use std::path::PathBuf;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream wearable audio service.
    pub upstream_base_url: String,
    /// Postgres connection string.
    pub db_url: String,
    /// Shared service-role key used for privileged DB/administrative operations.
    pub service_key: String,
    /// 32-byte AES-256 key, held as raw bytes (decoded once from hex at load time).
    pub encryption_key: [u8; 32],
    /// Root directory under which `audio/` and `clips/` subtrees are written.
    pub upload_dir: PathBuf,
    /// Laughter-probability threshold applied by the classifier runner.
    pub laughter_threshold: f32,
    /// Clip duration in seconds (symmetric around the event timestamp).
    pub clip_duration_secs: f32,
    /// Chunk size, in minutes, used by the time chunker.
    pub chunk_minutes: i64,
    /// Local time-of-day (`HH:MM`) the nightly fleet run is triggered at.
    pub nightly_utc: (u32, u32),
    /// Coarse verbose-logging switch, independent of `RUST_LOG`.
    pub verbose_logs: bool,
    /// Path to the classifier's ONNX model file. The model's internals are
    /// out of scope; this is only where the process-wide singleton loads it from.
    pub model_path: PathBuf,
}

impl Config {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`Error::ConfigMissing`] for an absent required variable and
    /// [`Error::ConfigInvalid`] for a present-but-malformed one.
    pub fn from_env() -> Result<Self> {
        let upstream_base_url = require_env("UPSTREAM_BASE_URL")?;
        let db_url = require_env("DB_URL")?;
        let service_key = require_env("SERVICE_KEY")?;
        let encryption_key = parse_encryption_key(&require_env("ENCRYPTION_KEY")?)?;

        let upload_dir = optional_env("UPLOAD_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR), PathBuf::from);

        let laughter_threshold = optional_parsed("LAUGHTER_THRESHOLD", DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&laughter_threshold) {
            return Err(Error::ConfigInvalid {
                name: "LAUGHTER_THRESHOLD".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        let clip_duration_secs = optional_parsed("CLIP_DURATION", DEFAULT_CLIP_DURATION)?;
        if clip_duration_secs <= 0.0 {
            return Err(Error::ConfigInvalid {
                name: "CLIP_DURATION".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let chunk_minutes = optional_parsed("CHUNK_MINUTES", DEFAULT_CHUNK_MINUTES)?;
        if chunk_minutes <= 0 {
            return Err(Error::ConfigInvalid {
                name: "CHUNK_MINUTES".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let nightly_utc = optional_env("NIGHTLY_UTC").map_or(Ok((9, 0)), |v| parse_hh_mm(&v))?;

        let verbose_logs = optional_env("VERBOSE_LOGS").is_some_and(|v| parse_bool(&v));

        let model_path =
            optional_env("MODEL_PATH").map_or_else(|| PathBuf::from("model.onnx"), PathBuf::from);

        Ok(Self {
            upstream_base_url,
            db_url,
            service_key,
            encryption_key,
            upload_dir,
            laughter_threshold,
            clip_duration_secs,
            chunk_minutes,
            nightly_utc,
            verbose_logs,
            model_path,
        })
    }

    /// Directory audio segment blobs for `user_id` are written under.
    #[must_use]
    pub fn audio_dir(&self, user_id: &str) -> PathBuf {
        self.upload_dir.join("audio").join(user_id)
    }

    /// Directory laughter clips for `user_id` are written under.
    #[must_use]
    pub fn clips_dir(&self, user_id: &str) -> PathBuf {
        self.upload_dir.join("clips").join(user_id)
    }

    /// The legacy, pre-per-user clips directory, retained only so the orphan
    /// reconciler can clean up files left over from before the migration.
    #[must_use]
    pub fn legacy_clips_dir(&self) -> PathBuf {
        self.upload_dir.join("clips")
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::ConfigMissing {
        name: name.to_string(),
    })
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match optional_env(name) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| Error::ConfigInvalid {
            name: name.to_string(),
            reason: format!("could not parse '{v}'"),
        }),
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_encryption_key(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).map_err(|e| Error::ConfigInvalid {
        name: "ENCRYPTION_KEY".to_string(),
        reason: format!("not valid hex: {e}"),
    })?;
    let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| Error::ConfigInvalid {
        name: "ENCRYPTION_KEY".to_string(),
        reason: format!("must decode to exactly 32 bytes, got {}", v.len()),
    })?;
    Ok(array)
}

fn parse_hh_mm(v: &str) -> Result<(u32, u32)> {
    let invalid = || Error::ConfigInvalid {
        name: "NIGHTLY_UTC".to_string(),
        reason: format!("expected HH:MM, got '{v}'"),
    };
    let (h, m) = v.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}
