//! Wall-clock helpers shared by the window store, the sweeper and the API layer.

use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, Duration,
    OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

use crate::db::types::TestStatus;

/// Upper bound for a test duration; keeps window arithmetic far from overflow.
const MAX_DURATION_MINUTES: f64 = 60.0 * 24.0 * 366.0;

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Three-state live status of a window. Without an end the window never closes.
pub(crate) fn live_status(
    now: OffsetDateTime,
    start: OffsetDateTime,
    end: Option<OffsetDateTime>,
) -> TestStatus {
    if now < start {
        return TestStatus::Upcoming;
    }

    match end {
        Some(end) if now >= end => TestStatus::Completed,
        _ => TestStatus::Ongoing,
    }
}

/// Same as [`live_status`] for raw RFC 3339 values. Anything unparseable is
/// reported as `Upcoming` instead of failing.
pub(crate) fn live_status_from_raw(now: OffsetDateTime, start: &str, end: Option<&str>) -> TestStatus {
    let Some(start) = parse_instant(start) else {
        return TestStatus::Upcoming;
    };

    let end = match end {
        Some(raw) => match parse_instant(raw) {
            Some(value) => Some(value),
            None => return TestStatus::Upcoming,
        },
        None => None,
    };

    live_status(now, start, end)
}

pub(crate) fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

pub(crate) fn is_valid_duration(duration_minutes: f64) -> bool {
    duration_minutes.is_finite() && duration_minutes > 0.0 && duration_minutes <= MAX_DURATION_MINUTES
}

/// `start + duration_minutes * 60s`, or `None` for a duration that is not a
/// positive finite number.
pub(crate) fn window_end(start: OffsetDateTime, duration_minutes: f64) -> Option<OffsetDateTime> {
    if !is_valid_duration(duration_minutes) {
        return None;
    }

    let span = Duration::milliseconds((duration_minutes * 60_000.0).round() as i64);
    start.checked_add(span)
}

pub(crate) fn offset_from_minutes(minutes: i32) -> Option<UtcOffset> {
    let seconds = minutes.checked_mul(60)?;
    UtcOffset::from_whole_seconds(seconds).ok()
}

/// Splits an instant into the naive `(date, time)` pair a viewer at `offset` sees.
pub(crate) fn split_local(instant: OffsetDateTime, offset: UtcOffset) -> (Date, Time) {
    let local = instant.to_offset(offset);
    (local.date(), local.time())
}

pub(crate) fn combine_local(date: Date, time: Time, offset: UtcOffset) -> OffsetDateTime {
    PrimitiveDateTime::new(date, time).assume_offset(offset)
}

pub(crate) fn parse_local_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub(crate) fn parse_local_time(raw: &str) -> Option<Time> {
    let raw = raw.trim();
    Time::parse(raw, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]")))
        .ok()
}

pub(crate) fn format_local_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_else(|_| date.to_string())
}

pub(crate) fn format_local_time(time: Time) -> String {
    time.format(format_description!("[hour]:[minute]")).unwrap_or_else(|_| time.to_string())
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}
