//! C5 Clip Writer: cuts a fixed-duration window around each event and
//! writes it to a per-user directory.

mod writer;

pub use writer::{ClipWriter, clip_file_name, extract_clip_samples};
