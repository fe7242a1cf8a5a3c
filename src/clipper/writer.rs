//! WAV clip writing with temp-file-then-rename atomicity.

use crate::classifier::Event;
use crate::constants::DEFAULT_CLIP_HALF_WINDOW;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Writes laughter-event clips into a user's clips directory.
pub struct ClipWriter {
    clips_dir: PathBuf,
}

impl ClipWriter {
    /// Create a writer rooted at `clips_dir` (e.g. `uploads/clips/{user_id}`).
    #[must_use]
    pub fn new(clips_dir: PathBuf) -> Self {
        Self { clips_dir }
    }

    /// Write the clip for `event` found in a segment starting at
    /// `segment_stem` (the segment's file stem, used as the clip's name
    /// prefix) and whose decoded waveform is `samples` at `sample_rate`.
    ///
    /// Writes to a temp path in the same directory first, then renames on
    /// success; the temp file is removed on any error so a crash mid-write
    /// never leaves a half-written file at the final path.
    ///
    /// # Errors
    /// Returns [`Error::OutputDirCreateFailed`] if the clips directory
    /// cannot be created, or [`Error::ClipWriteFailed`] if `hound` fails.
    pub async fn write(
        &self,
        segment_stem: &str,
        samples: &[f32],
        sample_rate: u32,
        event: &Event,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.clips_dir)
            .await
            .map_err(|e| Error::OutputDirCreateFailed {
                path: self.clips_dir.clone(),
                source: e,
            })?;

        let clip_samples =
            extract_clip_samples(samples, sample_rate, event.timestamp_rel_s, DEFAULT_CLIP_HALF_WINDOW);
        let final_name = clip_file_name(segment_stem, event.timestamp_rel_s, event.class_id);
        let final_path = self.clips_dir.join(&final_name);
        let temp_path = self.clips_dir.join(format!(".{final_name}.tmp"));

        let write_result = write_wav_blocking(&temp_path, &clip_samples, sample_rate);

        match write_result {
            Ok(()) => {
                tokio::fs::rename(&temp_path, &final_path)
                    .await
                    .map_err(Error::Io)?;
                Ok(final_path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}

fn write_wav_blocking(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| Error::ClipWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| Error::ClipWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }
    writer.finalize().map_err(|e| Error::ClipWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Extract the sample range `[T0 + ts - half_window, T0 + ts + half_window]`
/// from `samples`, clamped to the waveform's bounds. Pure, no I/O.
#[must_use]
pub fn extract_clip_samples(
    samples: &[f32],
    sample_rate: u32,
    timestamp_rel_s: f64,
    half_window: f32,
) -> Vec<f32> {
    let center = timestamp_rel_s;
    let start_s = (center - f64::from(half_window)).max(0.0);
    let end_s = center + f64::from(half_window);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let start_sample = (start_s * f64::from(sample_rate)) as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let end_sample = ((end_s * f64::from(sample_rate)) as usize).min(samples.len());

    if start_sample >= end_sample {
        return Vec::new();
    }
    samples[start_sample..end_sample].to_vec()
}

/// Format the clip file name, per
/// `{segment_stem}_laughter_{ts_with_dot_as_dash}_{class_id}.wav`.
///
/// Including `class_id` is mandatory: two events at the same timestamp with
/// different classes must not collide on disk.
#[must_use]
pub fn clip_file_name(segment_stem: &str, timestamp_rel_s: f64, class_id: u32) -> String {
    let ts = format!("{timestamp_rel_s:.2}").replace('.', "-");
    format!("{segment_stem}_laughter_{ts}_{class_id}.wav")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sine(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.01).sin()).collect()
    }

    #[test]
    fn test_clip_file_name_format() {
        let name = clip_file_name("20250101_090000-20250101_093000", 5.0, 13);
        assert_eq!(name, "20250101_090000-20250101_093000_laughter_5-00_13.wav");
    }

    #[test]
    fn test_clip_file_name_distinguishes_class_id() {
        let a = clip_file_name("seg", 5.0, 13);
        let b = clip_file_name("seg", 5.0, 15);
        assert_ne!(a, b);
    }

    #[test]
    fn test_extract_clip_samples_clamped_at_start() {
        let samples = sine(16_000 * 4);
        let clip = extract_clip_samples(&samples, 16_000, 0.0, 2.0);
        assert_eq!(clip.len(), 2 * 16_000);
    }

    #[test]
    fn test_extract_clip_samples_clamped_at_end() {
        let samples = sine(16_000 * 3);
        let clip = extract_clip_samples(&samples, 16_000, 2.9, 2.0);
        assert_eq!(clip.len(), samples.len() - (0.9 * 16_000.0) as usize);
    }

    #[test]
    fn test_extract_clip_samples_centered() {
        let samples = sine(16_000 * 10);
        let clip = extract_clip_samples(&samples, 16_000, 5.0, 2.0);
        assert_eq!(clip.len(), 4 * 16_000);
    }

    #[tokio::test]
    async fn test_write_clip_creates_file_and_no_temp_left_behind() {
        let dir = TempDir::new().unwrap();
        let writer = ClipWriter::new(dir.path().to_path_buf());
        let event = Event {
            timestamp_rel_s: 1.0,
            probability: 0.9,
            class_id: 13,
            class_name: "Laughter",
        };
        let samples = sine(16_000 * 4);
        let path = writer.write("seg", &samples, 16_000, &event).await.unwrap();
        assert!(path.exists());
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "only the final clip file should remain");
    }
}
