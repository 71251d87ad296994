//! Slot computation for a single practitioner's calendar.
//!
//! Pure functions over parsed calendar data: the weekly recurring windows,
//! an optional date-specific exception, and the day's existing bookings.
//! Callers load rows, parse them, and get back the ordered list of bookable
//! slots. Nothing here touches the database or the clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::ApiError;

/// Default scan step between candidate slot starts (minutes).
pub const DEFAULT_SLOT_INTERVAL_MIN: i64 = 15;

/// A recurring weekly open window. `day_of_week` uses 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyRule {
    pub day_of_week: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub available: bool,
}

/// A date-specific override. Takes absolute precedence over weekly rules:
/// `available = false` closes the whole date; `available = true` with a
/// window replaces the weekly windows for that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateException {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub available: bool,
}

/// One bookable interval of exactly the requested service duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// overlap iff `a_start < b_end && b_start < a_end`. Abutting intervals
/// (end == next start) do not overlap, so back-to-back booking is legal.
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Compute the ordered list of bookable slots on `date` for a service of
/// `duration_min` minutes.
///
/// `booked` must contain only intervals that still block the calendar
/// (cancelled appointments are the caller's job to filter out). The result
/// is recomputed fresh on every call; an empty list is the normal outcome
/// for a closed day, never an error.
pub fn compute_available_slots(
    date: NaiveDate,
    duration_min: i64,
    weekly: &[WeeklyRule],
    exception: Option<&DateException>,
    booked: &[(NaiveDateTime, NaiveDateTime)],
    interval_min: i64,
) -> Result<Vec<Slot>, ApiError> {
    if duration_min <= 0 {
        return Err(ApiError::InvalidInput(
            "service duration must be positive".into(),
        ));
    }
    if interval_min <= 0 {
        return Err(ApiError::InvalidInput(
            "slot interval must be positive".into(),
        ));
    }

    let weekday = date.weekday().num_days_from_sunday();
    let mut windows: Vec<(NaiveTime, NaiveTime)> = weekly
        .iter()
        .filter(|r| r.available && r.day_of_week == weekday)
        .map(|r| (r.start, r.end))
        .collect();
    windows.sort();

    if let Some(ex) = exception {
        if !ex.available {
            return Ok(Vec::new());
        }
        // The exception window replaces the weekly windows. A missing bound
        // falls back to the first weekly window's bound; with no weekly rule
        // to fall back on the date stays closed.
        let fallback = windows.first().copied();
        let start = ex.start.or(fallback.map(|w| w.0));
        let end = ex.end.or(fallback.map(|w| w.1));
        match (start, end) {
            (Some(s), Some(e)) => windows = vec![(s, e)],
            _ => return Ok(Vec::new()),
        }
    }

    let duration = Duration::minutes(duration_min);
    let step = Duration::minutes(interval_min);
    let mut slots = Vec::new();

    for (win_start, win_end) in windows {
        let window_end = date.and_time(win_end);
        let mut cursor = date.and_time(win_start);

        // Fixed-step scan: a long blocked interval yields several consecutive
        // skipped candidates rather than a jump past the conflict.
        while cursor + duration <= window_end {
            let slot_end = cursor + duration;
            let blocked = booked
                .iter()
                .any(|&(b_start, b_end)| intervals_overlap(cursor, slot_end, b_start, b_end));
            if !blocked {
                slots.push(Slot {
                    start: cursor,
                    end: slot_end,
                });
            }
            cursor += step;
        }
    }

    slots.sort_by_key(|s| s.start);
    slots.dedup_by_key(|s| s.start);
    Ok(slots)
}

// ── Tests ──
