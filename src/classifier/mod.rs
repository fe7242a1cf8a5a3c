//! C4 Classifier Runner: turns decoded audio into candidate laughter events.
//!
//! The actual acoustic model is out of scope for this crate; what is in
//! scope is the [`LaughterClassifier`] trait boundary, the patch-emission
//! algorithm built on top of it, and the process-wide model lifecycle.

mod fake;
mod onnx;

pub use fake::FakeClassifier;
pub use onnx::{OnnxClassifier, default_cache_dir, global};

use crate::constants::{
    CLASSIFIER_SAMPLE_RATE, LAUGHTER_CLASSES, PATCH_DURATION_SECS, PATCH_HOP_SECS,
};
use crate::error::{Error, Result};

/// Per-patch class probabilities, as returned by the model for one analysis window.
#[derive(Debug, Clone)]
pub struct PatchScores {
    /// `(class_id, probability)` pairs for this patch, over the full label set.
    pub scores: Vec<(u32, f32)>,
}

/// One above-threshold patch for one laughter class, relative to the start
/// of the segment the classifier was run against.
#[derive(Debug, Clone)]
pub struct Event {
    /// Offset from the segment start, in seconds.
    pub timestamp_rel_s: f64,
    /// Classifier probability for this class at this patch.
    pub probability: f32,
    /// Classifier class id.
    pub class_id: u32,
    /// Human-readable class name.
    pub class_name: &'static str,
}

/// Given 16 kHz mono samples, return per-patch class scores.
///
/// Implementations must be deterministic for a given waveform and model:
/// callers (and the test suite) rely on byte-for-byte reproducible output.
pub trait LaughterClassifier: Send + Sync {
    /// Run inference over `samples`, returning one [`PatchScores`] per patch.
    ///
    /// # Errors
    /// Returns [`Error::MalformedWaveform`] if `samples` is not a flat,
    /// rank-1 mono buffer, or [`Error::Inference`] if the model itself fails.
    fn classify(&self, samples: &[f32]) -> Result<Vec<PatchScores>>;
}

/// Run the classifier over a 16 kHz mono waveform and emit [`Event`]s for
/// every patch/class pair at or above `threshold`.
///
/// # Errors
/// Propagates any error from `classifier.classify`.
pub fn detect_events(
    classifier: &dyn LaughterClassifier,
    samples: &[f32],
    threshold: f32,
) -> Result<Vec<Event>> {
    let patches = classifier.classify(samples)?;
    Ok(emit_events(&patches, threshold))
}

/// Pure patch-to-event mapping: for every patch and every laughter class
/// scoring at or above `threshold`, emit one [`Event`]. Split out from
/// [`detect_events`] so it can be unit-tested without a model.
#[must_use]
pub fn emit_events(patches: &[PatchScores], threshold: f32) -> Vec<Event> {
    let mut events = Vec::new();
    for (patch_index, patch) in patches.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let timestamp_rel_s = f64::from(patch_index as u32) * f64::from(PATCH_HOP_SECS);
        for &(class_id, name) in &LAUGHTER_CLASSES {
            if let Some(&(_, probability)) =
                patch.scores.iter().find(|(id, _)| *id == class_id)
                && probability >= threshold
            {
                events.push(Event {
                    timestamp_rel_s,
                    probability,
                    class_id,
                    class_name: name,
                });
            }
        }
    }
    events
}

/// Number of samples in one patch at the classifier's expected sample rate.
#[must_use]
pub fn patch_len_samples() -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (PATCH_DURATION_SECS * CLASSIFIER_SAMPLE_RATE as f32) as usize;
    n
}

/// Validate the decoder's waveform contract: rank-1, mono, 16 kHz.
///
/// # Errors
/// Returns [`Error::MalformedWaveform`] if `sample_rate` is not
/// [`CLASSIFIER_SAMPLE_RATE`] or the buffer is empty after a non-empty
/// input was expected.
pub fn validate_waveform(samples: &[f32], sample_rate: u32) -> Result<()> {
    if sample_rate != CLASSIFIER_SAMPLE_RATE {
        return Err(Error::MalformedWaveform {
            description: format!(
                "expected {CLASSIFIER_SAMPLE_RATE} Hz mono, got {sample_rate} Hz"
            ),
        });
    }
    let _ = samples;
    Ok(())
}
