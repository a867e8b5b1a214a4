use crate::application::tip_analyzer::{MAX_TIPS, MIN_SESSIONS_FOR_TIPS};
use crate::domain::models::{StudySession, StudyTip, TipCategory};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::text_generation_client::TextGenerationClient;
use chrono::Timelike;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

const FALLBACK_TIP_TITLE: &str = "Study Tip";
const TIP_PREFIXES: [&str; 3] = ["1.", "2.", "3."];

#[derive(Debug, Clone, PartialEq)]
pub struct StudyAnalysis {
    pub session_count: usize,
    pub average_focus: f64,
    pub most_studied_subject: Option<String>,
    pub total_minutes: u64,
    pub time_of_day_counts: Vec<(&'static str, usize)>,
    pub subject_counts: Vec<(String, usize)>,
}

impl StudyAnalysis {
    pub fn from_sessions(sessions: &[StudySession], tz: Tz) -> Self {
        let mut minutes_by_subject: BTreeMap<&str, u64> = BTreeMap::new();
        let mut count_by_subject: BTreeMap<&str, usize> = BTreeMap::new();
        let mut buckets = [("Morning", 0usize), ("Afternoon", 0), ("Evening", 0)];
        let mut focus_sum = 0u64;

        for session in sessions {
            *minutes_by_subject
                .entry(session.subject_name.as_str())
                .or_default() += u64::from(session.duration_minutes);
            *count_by_subject
                .entry(session.subject_name.as_str())
                .or_default() += 1;
            focus_sum += u64::from(session.focus_level);

            let hour = session.studied_at.with_timezone(&tz).hour();
            let bucket = if hour < 12 {
                0
            } else if hour < 18 {
                1
            } else {
                2
            };
            buckets[bucket].1 += 1;
        }

        let mut most_studied: Option<(&str, u64)> = None;
        for (subject, minutes) in &minutes_by_subject {
            if most_studied.is_none_or(|(_, best)| *minutes > best) {
                most_studied = Some((subject, *minutes));
            }
        }

        Self {
            session_count: sessions.len(),
            average_focus: if sessions.is_empty() {
                0.0
            } else {
                focus_sum as f64 / sessions.len() as f64
            },
            most_studied_subject: most_studied.map(|(subject, _)| subject.to_string()),
            total_minutes: minutes_by_subject.values().sum(),
            time_of_day_counts: buckets.into_iter().filter(|(_, count)| *count > 0).collect(),
            subject_counts: count_by_subject
                .into_iter()
                .map(|(subject, count)| (subject.to_string(), count))
                .collect(),
        }
    }

    pub fn render_prompt(&self, language: &str) -> String {
        let time_of_day = self
            .time_of_day_counts
            .iter()
            .map(|(label, count)| format!("{label}: {count} sessions"))
            .collect::<Vec<_>>()
            .join(", ");
        let subjects = self
            .subject_counts
            .iter()
            .map(|(subject, count)| format!("{subject} ({count} sessions)"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Based on the following study session analysis, provide 2-3 personalized study tips in {language}.\n\
             Each tip should be concise (under 100 words) and actionable.\n\
             \n\
             Study Analysis:\n\
             - Total sessions: {}\n\
             - Average focus level: {:.1}\n\
             - Most studied subject: {}\n\
             - Total study time: {} minutes\n\
             - Sessions by time of day: {time_of_day}\n\
             - Subject distribution: {subjects}\n\
             \n\
             Provide tips in this format:\n\
             1. [Title]: [Description]\n\
             2. [Title]: [Description]\n\
             3. [Title]: [Description]",
            self.session_count,
            self.average_focus,
            self.most_studied_subject.as_deref().unwrap_or("N/A"),
            self.total_minutes,
        )
    }
}

pub fn parse_numbered_tips(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| TIP_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
        .take(MAX_TIPS)
        .map(ToOwned::to_owned)
        .collect()
}

fn strip_number_prefix(value: &str) -> &str {
    let digits_end = value
        .char_indices()
        .find(|(_, character)| !character.is_ascii_digit())
        .map_or(value.len(), |(index, _)| index);
    if digits_end == 0 {
        return value.trim();
    }
    value[digits_end..]
        .strip_prefix('.')
        .map_or(value, str::trim)
        .trim()
}

pub fn tips_from_ai_lines(lines: &[String]) -> Vec<StudyTip> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let (title, description) = match line.split_once(':') {
                Some((title, description)) => (strip_number_prefix(title), description.trim()),
                None => (strip_number_prefix(line), line.trim()),
            };
            StudyTip {
                title: if title.is_empty() {
                    FALLBACK_TIP_TITLE.to_string()
                } else {
                    title.to_string()
                },
                description: description.to_string(),
                category: TipCategory::TimePattern,
                rank: index + 1,
            }
        })
        .collect()
}

pub struct AiTipAdapter<T>
where
    T: TextGenerationClient + ?Sized,
{
    client: Arc<T>,
    language: String,
    timezone: Tz,
}

impl<T> AiTipAdapter<T>
where
    T: TextGenerationClient + ?Sized,
{
    pub fn new(client: Arc<T>, language: impl Into<String>) -> Self {
        Self {
            client,
            language: language.into(),
            timezone: Tz::UTC,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub async fn generate_tips(&self, sessions: &[StudySession]) -> Result<Vec<String>, InfraError> {
        if sessions.len() < MIN_SESSIONS_FOR_TIPS {
            return Ok(Vec::new());
        }

        let prompt = StudyAnalysis::from_sessions(sessions, self.timezone).render_prompt(&self.language);
        let response = self.client.generate(&prompt).await?;
        let tips = parse_numbered_tips(&response);
        if tips.is_empty() {
            return Err(InfraError::TextGeneration(
                "response did not contain numbered tips".to_string(),
            ));
        }
        Ok(tips)
    }
}
