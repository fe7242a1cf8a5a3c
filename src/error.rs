//! Error types for the laughter-detection pipeline.

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required environment variable was missing.
    #[error("missing required environment variable '{name}'")]
    ConfigMissing {
        /// Name of the missing variable.
        name: String,
    },

    /// An environment variable had an invalid value.
    #[error("invalid value for environment variable '{name}': {reason}")]
    ConfigInvalid {
        /// Name of the invalid variable.
        name: String,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Failed to open audio file.
    #[error("failed to open audio file '{path}'")]
    AudioOpen {
        /// Path to the audio file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to decode audio.
    #[error("failed to decode audio from '{path}'")]
    AudioDecode {
        /// Path to the audio file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No audio tracks found.
    #[error("no audio tracks found in '{path}'")]
    NoAudioTracks {
        /// Path to the audio file.
        path: std::path::PathBuf,
    },

    /// Failed to resample audio.
    #[error("failed to resample audio: {reason}")]
    Resample {
        /// Description of the resampling failure.
        reason: String,
    },

    /// Failed to acquire the per-user run lock.
    #[error("a run is already in progress for this user: {path}")]
    AlreadyRunning {
        /// Path to the lock file.
        path: std::path::PathBuf,
    },

    /// Failed to create lock file.
    #[error("failed to create lock file '{path}'")]
    LockCreate {
        /// Path to the lock file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove lock file.
    #[error("failed to remove lock file '{path}'")]
    LockRemove {
        /// Path to the lock file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to initialize the classifier.
    #[error("failed to initialize classifier: {reason}")]
    ClassifierInit {
        /// Description of the initialization failure.
        reason: String,
    },

    /// Classifier inference failed.
    #[error("classifier inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// The waveform handed to the classifier was not the expected rank-1 mono layout.
    #[error("expected rank-1 mono waveform, got {description}")]
    MalformedWaveform {
        /// Description of the unexpected shape.
        description: String,
    },

    /// Failed to write a clip WAV file.
    #[error("failed to write clip file '{path}'")]
    ClipWriteFailed {
        /// Path to the clip file.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: hound::Error,
    },

    /// Failed to create an output directory.
    #[error("failed to create output directory '{path}'")]
    OutputDirCreateFailed {
        /// Path to the output directory.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The upstream request window exceeded the 2-hour cap.
    #[error("requested window {span_secs}s exceeds the 2-hour upstream cap")]
    WindowTooLarge {
        /// Requested span in seconds.
        span_secs: i64,
    },

    /// The upstream credential was rejected.
    #[error("upstream rejected the credential")]
    InvalidCredential,

    /// The upstream rate-limited this client.
    #[error("upstream rate limit exceeded")]
    RateLimited,

    /// The upstream returned an unexpected non-2xx, non-4xx/5xx-handled status.
    #[error("upstream error: HTTP {status}")]
    UpstreamError {
        /// HTTP status code returned.
        status: u16,
    },

    /// The upstream HTTP request itself failed (network, TLS, timeout).
    #[error("upstream request failed: {0}")]
    UpstreamRequest(#[from] reqwest::Error),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failed at startup.
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Encryption or decryption of a credential secret failed.
    #[error("credential encryption error: {reason}")]
    Crypto {
        /// Description of the failure.
        reason: String,
    },

    /// The user identified by the given id or email could not be found.
    #[error("user not found: {identifier}")]
    UserNotFound {
        /// The id or email supplied on the command line.
        identifier: String,
    },

    /// The user has no active upstream credential.
    #[error("user '{user_id}' has no active upstream credential")]
    NoActiveCredential {
        /// The user id.
        user_id: String,
    },

    /// An unknown IANA timezone name was supplied.
    #[error("unknown timezone: {name}")]
    UnknownTimezone {
        /// The offending timezone name.
        name: String,
    },

    /// Internal error for invariants that should be unreachable.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Process exit code this error should surface as, per the CLI contract.
    ///
    /// `0` is never produced here; callers use it only for the all-succeeded case.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigMissing { .. }
            | Self::ConfigInvalid { .. }
            | Self::Migration(_)
            | Self::UnknownTimezone { .. } => 2,
            _ => 1,
        }
    }
}
