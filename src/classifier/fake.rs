//! Deterministic in-memory classifier used by the test suite.

use super::{LaughterClassifier, PatchScores, patch_len_samples};
use crate::error::Result;
use std::collections::HashMap;

/// Maps a patch index to a fixed set of class scores. Production code never
/// constructs this; it exists so scenario tests can drive C4-C6 without an
/// ONNX model.
#[derive(Debug, Clone, Default)]
pub struct FakeClassifier {
    /// Scripted scores keyed by patch index. Patches with no entry score
    /// every class at `0.0`.
    pub scripted: HashMap<usize, Vec<(u32, f32)>>,
}

impl FakeClassifier {
    /// A classifier that emits the given `(class_id, probability)` pairs at
    /// the given patch index, with all other patches silent.
    #[must_use]
    pub fn with_patch(patch_index: usize, scores: Vec<(u32, f32)>) -> Self {
        let mut scripted = HashMap::new();
        scripted.insert(patch_index, scores);
        Self { scripted }
    }
}

impl LaughterClassifier for FakeClassifier {
    fn classify(&self, samples: &[f32]) -> Result<Vec<PatchScores>> {
        let patch_len = patch_len_samples();
        if patch_len == 0 {
            return Ok(Vec::new());
        }
        let num_patches = samples.len().div_ceil(patch_len);
        Ok((0..num_patches)
            .map(|i| PatchScores {
                scores: self.scripted.get(&i).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_classifier_emits_scripted_patch() {
        let fake = FakeClassifier::with_patch(0, vec![(13, 0.9)]);
        let samples = vec![0.0_f32; patch_len_samples()];
        let patches = fake.classify(&samples).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].scores, vec![(13, 0.9)]);
    }

    #[test]
    fn test_fake_classifier_unscripted_patches_are_silent() {
        let fake = FakeClassifier::with_patch(5, vec![(13, 0.9)]);
        let samples = vec![0.0_f32; patch_len_samples()];
        let patches = fake.classify(&samples).unwrap();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].scores.is_empty());
    }
}
