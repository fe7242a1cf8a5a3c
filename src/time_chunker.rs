//! Splits a UTC time window into fixed-size sub-windows.
//!
//! Pure and stateless: given `[start, end)` and a step `delta`, yields
//! `[cur, min(cur + delta, end))` until `cur >= end`. This is a different
//! operation from [`crate::audio::chunk_audio`], which frames an
//! already-decoded sample buffer for the classifier.

use chrono::{DateTime, TimeDelta, Utc};

/// One sub-window of a larger time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeChunk {
    /// Inclusive start of the chunk.
    pub start: DateTime<Utc>,
    /// Exclusive end of the chunk.
    pub end: DateTime<Utc>,
}

impl TimeChunk {
    /// Span of this chunk in seconds.
    #[must_use]
    pub fn span_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Divide `[start, end)` into chunks of at most `delta` each.
///
/// Returns an empty vector if `start >= end`. Panics only through
/// `TimeDelta` construction, never on valid non-negative `delta_minutes`.
#[must_use]
pub fn chunks(start: DateTime<Utc>, end: DateTime<Utc>, delta_minutes: i64) -> Vec<TimeChunk> {
    assert!(delta_minutes > 0, "chunk delta must be positive");
    let delta = TimeDelta::minutes(delta_minutes);

    let mut out = Vec::new();
    let mut cur = start;
    while cur < end {
        let next = (cur + delta).min(end);
        out.push(TimeChunk {
            start: cur,
            end: next,
        });
        cur = next;
    }
    out
}

/// Two UTC ranges overlap iff `a.start < b.end && b.start < a.end`.
///
/// Used uniformly wherever range-vs-range overlap is checked (the
/// pre-download gate and the orphan reconciler's cross-checks); kept
/// distinct from the detection dedup layer's closed point-distance check.
#[must_use]
pub fn ranges_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_even_division() {
        let result = chunks(t(0, 0), t(1, 0), 30);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].start, t(0, 0));
        assert_eq!(result[0].end, t(0, 30));
        assert_eq!(result[1].end, t(1, 0));
    }

    #[test]
    fn test_final_chunk_truncated() {
        let result = chunks(t(0, 0), t(0, 45), 30);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].span_secs(), 15 * 60);
    }

    #[test]
    fn test_empty_window_emits_nothing() {
        let same = t(5, 0);
        assert!(chunks(same, same, 30).is_empty());
        assert!(chunks(t(5, 0), t(4, 0), 30).is_empty());
    }

    #[test]
    fn test_ranges_overlap() {
        assert!(ranges_overlap(t(0, 0), t(1, 0), t(0, 30), t(1, 30)));
        assert!(!ranges_overlap(t(0, 0), t(1, 0), t(1, 0), t(2, 0)));
        assert!(!ranges_overlap(t(0, 0), t(1, 0), t(1, 1), t(2, 0)));
    }
}
