use crate::domain::models::{StudySession, StudyTip, TipCategory};
use chrono::Timelike;
use chrono_tz::Tz;
use std::collections::BTreeMap;

pub const MIN_SESSIONS_FOR_TIPS: usize = 3;
pub const MAX_TIPS: usize = 3;
const TREND_WINDOW: usize = 5;
const LONG_SESSION_MINUTES: u32 = 120;
const SHORT_SESSION_MINUTES: u32 = 30;

fn average(values: impl Iterator<Item = u8>) -> Option<f64> {
    let (count, sum) = values.fold((0u32, 0u32), |(count, sum), value| {
        (count + 1, sum + u32::from(value))
    });
    (count > 0).then(|| f64::from(sum) / f64::from(count))
}

pub fn time_of_day_label(hour: u32) -> &'static str {
    if hour < 12 {
        "morning"
    } else if hour < 18 {
        "afternoon"
    } else {
        "evening"
    }
}

fn peak_focus_tip(sessions: &[StudySession], tz: Tz) -> Option<StudyTip> {
    let mut by_hour: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    for session in sessions {
        let hour = session.studied_at.with_timezone(&tz).hour();
        by_hour.entry(hour).or_default().push(session.focus_level);
    }

    // Ascending hour order, so a strict comparison keeps the earliest hour on ties.
    let mut peak: Option<(u32, u32, &Vec<u8>)> = None;
    for (hour, levels) in &by_hour {
        let focus_sum: u32 = levels.iter().map(|level| u32::from(*level)).sum();
        if peak.is_none_or(|(_, best, _)| focus_sum > best) {
            peak = Some((*hour, focus_sum, levels));
        }
    }

    let (hour, _, levels) = peak?;
    let average_focus = average(levels.iter().copied())?;
    if average_focus < 4.0 || levels.len() < 3 {
        return None;
    }
    Some(StudyTip {
        title: "Peak Focus Time".to_string(),
        description: format!(
            "You show highest focus levels during {} ({hour}:00). Consider scheduling important study sessions during this time.",
            time_of_day_label(hour)
        ),
        category: TipCategory::TimePattern,
        rank: 0,
    })
}

fn focus_trend_tip(sessions: &[StudySession]) -> Option<StudyTip> {
    let mut by_recency: Vec<&StudySession> = sessions.iter().collect();
    by_recency.sort_by(|left, right| right.studied_at.cmp(&left.studied_at));

    let recent = average(
        by_recency
            .iter()
            .take(TREND_WINDOW)
            .map(|session| session.focus_level),
    )?;
    let older = average(
        by_recency
            .iter()
            .skip(TREND_WINDOW)
            .take(TREND_WINDOW)
            .map(|session| session.focus_level),
    )?;
    if recent >= older - 0.5 {
        return None;
    }
    Some(StudyTip {
        title: "Focus Level Trend".to_string(),
        description: format!(
            "Your focus levels have decreased recently (average {recent:.1} vs {older:.1} before). Consider taking breaks between sessions or adjusting your study environment."
        ),
        category: TipCategory::FocusTrend,
        rank: 0,
    })
}

fn subject_balance_tip(sessions: &[StudySession]) -> Option<StudyTip> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for session in sessions {
        *totals.entry(session.subject_name.as_str()).or_default() +=
            u64::from(session.duration_minutes);
    }
    if totals.len() < 2 {
        return None;
    }

    let total: u64 = totals.values().sum();
    let mut top: Option<(&str, u64)> = None;
    for (subject, minutes) in &totals {
        if top.is_none_or(|(_, best)| *minutes > best) {
            top = Some((subject, *minutes));
        }
    }
    let (subject, minutes) = top?;
    if total == 0 {
        return None;
    }
    let percentage = minutes * 100 / total;
    if percentage <= 60 {
        return None;
    }
    Some(StudyTip {
        title: "Subject Balance".to_string(),
        description: format!(
            "{subject} takes up {percentage}% of your study time. Consider diversifying your subjects for better overall progress."
        ),
        category: TipCategory::SubjectBalance,
        rank: 0,
    })
}

fn duration_tip(sessions: &[StudySession]) -> Option<StudyTip> {
    let long = average(
        sessions
            .iter()
            .filter(|session| session.duration_minutes > LONG_SESSION_MINUTES)
            .map(|session| session.focus_level),
    )?;
    let short = average(
        sessions
            .iter()
            .filter(|session| session.duration_minutes < SHORT_SESSION_MINUTES)
            .map(|session| session.focus_level),
    )?;
    if long >= short {
        return None;
    }
    Some(StudyTip {
        title: "Optimal Session Duration".to_string(),
        description: "Your focus tends to decrease in sessions longer than 2 hours. Consider breaking long study sessions into shorter, focused blocks with breaks.".to_string(),
        category: TipCategory::DurationOptimization,
        rank: 0,
    })
}

pub fn analyze_study_patterns(sessions: &[StudySession], tz: Tz) -> Vec<StudyTip> {
    if sessions.len() < MIN_SESSIONS_FOR_TIPS {
        return Vec::new();
    }

    [
        peak_focus_tip(sessions, tz),
        focus_trend_tip(sessions),
        subject_balance_tip(sessions),
        duration_tip(sessions),
    ]
    .into_iter()
    .flatten()
    .take(MAX_TIPS)
    .enumerate()
    .map(|(index, tip)| StudyTip {
        rank: index + 1,
        ..tip
    })
    .collect()
}
