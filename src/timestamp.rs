use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d. %H:%M",
    "%Y.%m.%d %H:%M",
];

/// Parse an upstream timestamp.
///
/// Strings with an offset are taken as-is; naive strings are local time in
/// `tz`. The result is truncated to whole minutes.
pub fn parse_timestamp(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return truncate_to_minute(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| localize(naive, tz))
}

/// Interpret a naive wall-clock time in `tz`. Times inside a DST gap have no
/// instant and yield `None`; ambiguous ones take the earlier instant.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .and_then(|dt| truncate_to_minute(dt.with_timezone(&Utc)))
}

pub fn truncate_to_minute(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    dt.with_second(0).and_then(|dt| dt.with_nanosecond(0))
}
