//! Production classifier backed by an ONNX Runtime session.
//!
//! The model is loaded once per process behind a [`std::sync::OnceLock`].
//! If session creation fails because of a corrupted on-disk cache, the
//! cache is cleared and loading is retried once; a second failure is fatal.

use super::{LaughterClassifier, PatchScores, patch_len_samples};
use crate::constants::CLASSIFIER_SAMPLE_RATE;
use crate::error::{Error, Result};
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{error, warn};

/// ONNX-graph-backed [`LaughterClassifier`].
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Load the model at `model_path`, clearing `cache_dir` and retrying
    /// once if the first load fails (a corrupted execution-provider cache
    /// is the only failure mode this is expected to recover from).
    ///
    /// # Errors
    /// Returns [`Error::ClassifierInit`] if both attempts fail.
    pub fn load(model_path: &Path, cache_dir: &Path) -> Result<Self> {
        match Session::builder()
            .and_then(|b| b.commit_from_file(model_path))
        {
            Ok(session) => Ok(Self {
                session: Mutex::new(session),
            }),
            Err(first_err) => {
                warn!(error = %first_err, "classifier session load failed, clearing cache and retrying once");
                let _ = std::fs::remove_dir_all(cache_dir);
                Session::builder()
                    .and_then(|b| b.commit_from_file(model_path))
                    .map(|session| Self {
                        session: Mutex::new(session),
                    })
                    .map_err(|second_err| {
                        error!(error = %second_err, "classifier session load failed again after cache clear");
                        Error::ClassifierInit {
                            reason: second_err.to_string(),
                        }
                    })
            }
        }
    }
}

impl LaughterClassifier for OnnxClassifier {
    fn classify(&self, samples: &[f32]) -> Result<Vec<PatchScores>> {
        super::validate_waveform(samples, CLASSIFIER_SAMPLE_RATE)?;

        let patch_len = patch_len_samples();
        if patch_len == 0 || samples.is_empty() {
            return Ok(Vec::new());
        }

        let frames = crate::audio::chunk_audio(
            samples,
            CLASSIFIER_SAMPLE_RATE,
            crate::constants::PATCH_DURATION_SECS,
            crate::constants::PATCH_DURATION_SECS - crate::constants::PATCH_HOP_SECS,
        );

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference {
                reason: "classifier session mutex poisoned".to_string(),
            })?;

        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            let input =
                Tensor::from_array(([1usize, frame.samples.len()], frame.samples)).map_err(
                    |e| Error::Inference {
                        reason: format!("failed to build input tensor: {e}"),
                    },
                )?;
            let outputs = session
                .run(ort::inputs!["waveform" => input])
                .map_err(|e| Error::Inference {
                    reason: format!("inference failed: {e}"),
                })?;
            let (_, scores) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference {
                    reason: format!("failed to extract output tensor: {e}"),
                })?;
            out.push(PatchScores {
                scores: scores
                    .iter()
                    .enumerate()
                    .map(|(id, &p)| (id as u32, p))
                    .collect(),
            });
        }
        Ok(out)
    }
}

/// Process-global model singleton, initialized on first use.
static CLASSIFIER: OnceLock<Arc<OnnxClassifier>> = OnceLock::new();

/// Get or initialize the process-wide classifier singleton.
///
/// # Errors
/// Returns whatever [`OnnxClassifier::load`] returns on first call; later
/// calls never re-attempt a failed load within the same process.
pub fn global(model_path: &Path, cache_dir: &Path) -> Result<Arc<OnnxClassifier>> {
    if let Some(existing) = CLASSIFIER.get() {
        return Ok(Arc::clone(existing));
    }
    let classifier = Arc::new(OnnxClassifier::load(model_path, cache_dir)?);
    Ok(Arc::clone(CLASSIFIER.get_or_init(|| classifier)))
}

/// Default cache directory used for execution-provider artifacts.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("laughter-pipeline-classifier-cache")
}
