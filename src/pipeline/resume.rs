//! Resume-point computation for each run mode.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name.
///
/// # Errors
/// Returns [`Error::UnknownTimezone`] if `name` is not recognized.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse().map_err(|_| Error::UnknownTimezone {
        name: name.to_string(),
    })
}

/// `[start, end)` covering the user's previous local day, in UTC.
#[must_use]
pub fn nightly_window(tz: Tz, now_utc: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today_local = now_utc.with_timezone(&tz).date_naive();
    let yesterday_local = today_local.pred_opt().unwrap_or(today_local);
    local_day_window(tz, yesterday_local)
}

/// `[start, end)` in UTC for the local calendar date `date`.
#[must_use]
pub fn local_day_window(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_local = tz
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    let next_day = date.succ_opt().unwrap_or(date);
    let end_local = tz
        .from_local_datetime(&next_day.and_time(NaiveTime::MIN))
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&next_day.and_time(NaiveTime::MIN)));
    (
        start_local.with_timezone(&Utc),
        end_local.with_timezone(&Utc),
    )
}

/// Resume point for "update today": `start = max(start_of_today_local, latest_segment_end)`,
/// capped at `now_utc` so a segment whose `end_utc` drifted into the future
/// under timezone skew cannot rewind the clock. `end = now_utc`.
#[must_use]
pub fn update_today_window(
    tz: Tz,
    now_utc: DateTime<Utc>,
    latest_segment_end: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let today_local = now_utc.with_timezone(&tz).date_naive();
    let (start_of_today_utc, _) = local_day_window(tz, today_local);

    let mut start = match latest_segment_end {
        Some(end) if end > start_of_today_utc => end,
        _ => start_of_today_utc,
    };
    if start > now_utc {
        start = now_utc;
    }
    (start, now_utc)
}

/// One UTC window to reprocess, grouped by the local date it belongs to so
/// C7 writes one log per day rather than one per run.
#[derive(Debug, Clone)]
pub struct ReprocessWindow {
    /// Local date this window summarizes.
    pub date_local: NaiveDate,
    /// Inclusive UTC start.
    pub start: DateTime<Utc>,
    /// Exclusive UTC end.
    pub end: DateTime<Utc>,
}

/// Expand `[from, to]` (inclusive local dates) into one [`ReprocessWindow`]
/// per day, correctly sized across DST transitions (a fall-back day is 25h,
/// a spring-forward day is 23h).
#[must_use]
pub fn reprocess_windows(tz: Tz, from: NaiveDate, to: NaiveDate) -> Vec<ReprocessWindow> {
    let mut out = Vec::new();
    let mut cur = from;
    while cur <= to {
        let (start, end) = local_day_window(tz, cur);
        out.push(ReprocessWindow {
            date_local: cur,
            start,
            end,
        });
        cur = cur.succ_opt().unwrap_or(cur);
        if cur == out.last().map(|w| w.date_local).unwrap_or(cur) {
            break;
        }
    }
    out
}
