use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_FOCUS_LEVEL: u8 = 1;
pub const MAX_FOCUS_LEVEL: u8 = 5;
pub const DEFAULT_FOCUS_LEVEL: u8 = 3;
pub const DUPLICATE_WINDOW_MILLIS: i64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudySession {
    pub id: i64,
    pub subject_name: String,
    pub subject_icon_url: Option<String>,
    pub studied_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub focus_level: u8,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewStudySession {
    pub subject_name: String,
    pub subject_icon_url: Option<String>,
    pub studied_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub focus_level: u8,
    pub notes: Option<String>,
}

impl NewStudySession {
    pub fn validate(&self) -> Result<(), String> {
        validate_session_fields(&self.subject_name, self.duration_minutes, self.focus_level)
    }

    /// Subject and duration must match exactly; notes and focus are ignored.
    pub fn duplicates(&self, existing: &StudySession) -> bool {
        existing.subject_name == self.subject_name
            && existing.duration_minutes == self.duration_minutes
            && (existing.studied_at - self.studied_at).num_milliseconds().abs()
                < DUPLICATE_WINDOW_MILLIS
    }

    pub fn into_session(self, id: i64) -> StudySession {
        StudySession {
            id,
            subject_name: self.subject_name,
            subject_icon_url: self.subject_icon_url,
            studied_at: self.studied_at,
            duration_minutes: self.duration_minutes,
            focus_level: self.focus_level,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end < start {
            return Err("window.end must not be before window.start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionFilter {
    pub subject: Option<String>,
    pub min_focus: Option<u8>,
    pub max_focus: Option<u8>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub search_query: Option<String>,
}

impl SessionFilter {
    pub fn for_window(window: &TimeWindow) -> Self {
        Self {
            start: Some(window.start),
            end: Some(window.end),
            ..Self::default()
        }
    }

    pub fn matches(&self, session: &StudySession) -> bool {
        if let Some(subject) = self.subject.as_deref() {
            if session.subject_name != subject {
                return false;
            }
        }
        if self.min_focus.is_some_and(|min| session.focus_level < min) {
            return false;
        }
        if self.max_focus.is_some_and(|max| session.focus_level > max) {
            return false;
        }
        if self.start.is_some_and(|start| session.studied_at < start) {
            return false;
        }
        if self.end.is_some_and(|end| session.studied_at > end) {
            return false;
        }
        if let Some(query) = self.search_query.as_deref() {
            let Some(notes) = session.notes.as_deref() else {
                return false;
            };
            // Mirrors SQLite LIKE, which folds ASCII case only.
            if !notes
                .to_ascii_lowercase()
                .contains(&query.to_ascii_lowercase())
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectCatalogEntry {
    pub id: String,
    pub name: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_duration_minutes: u64,
    pub most_studied_subject: Option<String>,
    pub average_focus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectDuration {
    pub subject_name: String,
    pub total_minutes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TipCategory {
    TimePattern,
    FocusTrend,
    SubjectBalance,
    DurationOptimization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyTip {
    pub title: String,
    pub description: String,
    pub category: TipCategory,
    pub rank: usize,
}

fn validate_session_fields(
    subject_name: &str,
    duration_minutes: u32,
    focus_level: u8,
) -> Result<(), String> {
    if subject_name.trim().is_empty() {
        return Err("session.subject_name must not be empty".to_string());
    }
    if duration_minutes == 0 {
        return Err("session.duration_minutes must be > 0".to_string());
    }
    if !(MIN_FOCUS_LEVEL..=MAX_FOCUS_LEVEL).contains(&focus_level) {
        return Err(format!(
            "session.focus_level must be within {MIN_FOCUS_LEVEL}..={MAX_FOCUS_LEVEL}"
        ));
    }
    Ok(())
}
