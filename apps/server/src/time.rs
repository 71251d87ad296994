use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Studio timezone offset (UTC-3).
const STUDIO_OFFSET_SECS: i32 = -3 * 3600;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";

/// Current wall-clock time in the studio's timezone.
///
/// All timestamps in the database are naive studio-local time; handlers call
/// this once per request and pass the value into the booking/availability
/// core, so tests can substitute a fixed instant.
pub fn studio_now() -> NaiveDateTime {
    let tz = FixedOffset::east_opt(STUDIO_OFFSET_SECS).unwrap();
    Utc::now().with_timezone(&tz).naive_local()
}

pub fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

/// Parse a stored or client-supplied timestamp. Accepts the storage format
/// and the ISO-8601 `T` separator used by frontend date pickers.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).ok()
}

/// Parse a time-of-day column. Stored as `HH:MM`; `HH:MM:SS` is accepted for
/// rows imported from older dumps.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

pub fn fmt_time_hm(dt: NaiveDateTime) -> String {
    dt.format("%H:%M").to_string()
}

/// Human-readable date for email bodies, e.g. "Monday, 02 March 2026".
pub fn fmt_date_long(dt: NaiveDateTime) -> String {
    dt.format("%A, %d %B %Y").to_string()
}

// ── Tests ──
