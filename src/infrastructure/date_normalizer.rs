use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

const UTC_MILLIS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const UTC_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";
const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateParseFailure {
    #[error("date is missing or blank")]
    Blank,
    #[error("unrecognized date format: {0}")]
    Unrecognized(String),
    #[error("local time {0} does not exist in the configured zone")]
    NonexistentLocalTime(String),
}

/// Zone-less inputs are read in `local`; ambiguous local times take the earlier instant.
pub fn normalize_external_date(raw: Option<&str>, local: Tz) -> Result<DateTime<Utc>, DateParseFailure> {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Err(DateParseFailure::Blank);
    };

    if let Some(instant) = parse_zoned(value) {
        return Ok(instant);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_ONLY_FORMAT) {
        return resolve_local(date.and_time(chrono::NaiveTime::MIN), local);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, LOCAL_DATETIME_FORMAT) {
        return resolve_local(naive, local);
    }
    if let Some(instant) = strip_zone_annotation(value).and_then(parse_zoned) {
        return Ok(instant);
    }

    Err(DateParseFailure::Unrecognized(value.to_string()))
}

fn parse_zoned(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, UTC_MILLIS_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, UTC_SECONDS_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_str(value, OFFSET_FORMAT)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

fn strip_zone_annotation(value: &str) -> Option<&str> {
    let without_close = value.strip_suffix(']')?;
    let open = without_close.rfind('[')?;
    Some(without_close[..open].trim_end())
}

fn resolve_local(naive: NaiveDateTime, local: Tz) -> Result<DateTime<Utc>, DateParseFailure> {
    match local.from_local_datetime(&naive) {
        LocalResult::Single(value) => Ok(value.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(DateParseFailure::NonexistentLocalTime(naive.to_string())),
    }
}
