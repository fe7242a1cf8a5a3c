//! Audio decoding, resampling, and patch framing.
//!
//! Decoding and resampling are unchanged concerns from any audio pipeline;
//! `chunker` here frames an already-decoded waveform into fixed-length,
//! overlapping analysis windows for the classifier (patches), which is a
//! different operation from the UTC time-window splitting in
//! [`crate::time_chunker`].

mod chunker;
mod decode;
mod resample;

pub use chunker::{AudioChunk, chunk_audio};
pub use decode::{DecodedAudio, decode_audio_file};
pub use resample::resample;
