use crate::error::{config_error, FilterResult};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Format used for the `start_time`/`end_time` state attributes
pub const ATTRIBUTE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an IANA time zone name such as `Europe/Helsinki`
pub fn parse_timezone(name: &str) -> FilterResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| config_error(&format!("Unknown time zone: {}", name)))
}

/// Current time in the given zone
pub fn now_in(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Resolve a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// fall in a DST gap are read as UTC and shifted into the zone.
pub fn resolve_local(naive: &NaiveDateTime, tz: &Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz.from_utc_datetime(naive),
    }
}

/// Look-ahead window `[now, now + span)`
pub fn lookahead_window(
    now: DateTime<Tz>,
    span: Duration,
) -> FilterResult<(DateTime<Tz>, DateTime<Tz>)> {
    let end = now.checked_add_signed(span).ok_or_else(|| {
        config_error(&format!(
            "Look-ahead of {} hours does not fit in the calendar range",
            span.num_hours()
        ))
    })?;
    Ok((now, end))
}

/// Render a time for the published state attributes
pub fn format_attribute_time(dt: &DateTime<Tz>) -> String {
    dt.format(ATTRIBUTE_TIME_FORMAT).to_string()
}
