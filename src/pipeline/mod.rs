//! C8 Per-User Pipeline: resume-point computation plus the run loop itself.

mod resume;
mod runner;

pub use resume::{
    ReprocessWindow, local_day_window, nightly_window, parse_timezone, reprocess_windows,
    update_today_window,
};
pub use runner::run;
