use crate::domain::models::{
    DEFAULT_FOCUS_LEVEL, MAX_FOCUS_LEVEL, MIN_FOCUS_LEVEL, NewStudySession, SubjectCatalogEntry,
};
use crate::domain::subjects::{build_catalog, icon_for, resolve_subject_name};
use crate::infrastructure::date_normalizer::{DateParseFailure, normalize_external_date};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExternalSessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "subject_name", default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "subject_date", default, skip_serializing_if = "Option::is_none")]
    pub subject_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ExternalSessionRecord {
    pub fn label(&self) -> String {
        match self.id.as_ref() {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => "<no id>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordRejection {
    #[error("invalid subject_date: {0}")]
    Date(#[from] DateParseFailure),
    #[error("no usable subject name")]
    UnresolvedSubject,
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(i64),
    #[error("malformed {field} value: {value}")]
    MalformedNumber { field: &'static str, value: String },
}

pub fn decode_external_record(
    record: &ExternalSessionRecord,
    local: Tz,
) -> Result<NewStudySession, RecordRejection> {
    let studied_at = normalize_external_date(record.subject_date.as_deref(), local)?;

    let subject_name = resolve_subject_name(record.subject_name.as_deref(), record.name.as_deref())
        .ok_or(RecordRejection::UnresolvedSubject)?;

    let duration = record
        .duration
        .as_ref()
        .map(|value| parse_feed_integer(value, "duration"))
        .transpose()?
        .unwrap_or(0);
    if duration <= 0 {
        return Err(RecordRejection::NonPositiveDuration(duration));
    }
    let duration_minutes = u32::try_from(duration).map_err(|_| RecordRejection::MalformedNumber {
        field: "duration",
        value: duration.to_string(),
    })?;

    let focus_level = record
        .level
        .as_ref()
        .map(|value| parse_feed_integer(value, "level"))
        .transpose()?
        .map(|level| level.clamp(i64::from(MIN_FOCUS_LEVEL), i64::from(MAX_FOCUS_LEVEL)) as u8)
        .unwrap_or(DEFAULT_FOCUS_LEVEL);

    let notes = record
        .notes
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned);

    Ok(NewStudySession {
        subject_icon_url: Some(icon_for(&subject_name).to_string()),
        subject_name,
        studied_at,
        duration_minutes,
        focus_level,
        notes,
    })
}

pub fn extract_distinct_subjects(records: &[ExternalSessionRecord]) -> Vec<SubjectCatalogEntry> {
    build_catalog(records.iter().filter_map(|record| {
        resolve_subject_name(record.subject_name.as_deref(), record.name.as_deref())
    }))
}

fn parse_feed_integer(value: &Value, field: &'static str) -> Result<i64, RecordRejection> {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral_f64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    };
    parsed.ok_or_else(|| RecordRejection::MalformedNumber {
        field,
        value: value.to_string(),
    })
}

fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
