use crate::domain::models::{NewStudySession, SessionFilter, StudySession, TimeWindow};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait SessionStore: Send + Sync {
    fn list_all(&self) -> Result<Vec<StudySession>, InfraError>;
    fn list_filtered(&self, filter: &SessionFilter) -> Result<Vec<StudySession>, InfraError>;
    fn insert(&self, session: &NewStudySession) -> Result<StudySession, InfraError>;
    fn delete(&self, id: i64) -> Result<bool, InfraError>;

    fn list_in_window(&self, window: &TimeWindow) -> Result<Vec<StudySession>, InfraError> {
        self.list_filtered(&SessionFilter::for_window(window))
    }
}

fn format_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::Store(format!("invalid study_sessions.studied_at '{value}': {error}")))
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn validated(session: &NewStudySession) -> Result<NewStudySession, InfraError> {
    session.validate().map_err(InfraError::InvalidSession)?;
    let mut session = session.clone();
    session.studied_at = session.studied_at.trunc_subsecs(3);
    Ok(session)
}

struct SessionRow {
    id: i64,
    subject_name: String,
    subject_icon_url: Option<String>,
    studied_at: String,
    duration_minutes: i64,
    focus_level: i64,
    notes: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<StudySession, InfraError> {
        let duration_minutes = u32::try_from(self.duration_minutes).map_err(|_| {
            InfraError::Store(format!(
                "invalid duration_minutes {} for session {}",
                self.duration_minutes, self.id
            ))
        })?;
        let focus_level = u8::try_from(self.focus_level).map_err(|_| {
            InfraError::Store(format!(
                "invalid focus_level {} for session {}",
                self.focus_level, self.id
            ))
        })?;
        Ok(StudySession {
            id: self.id,
            subject_name: self.subject_name,
            subject_icon_url: self.subject_icon_url,
            studied_at: parse_instant(&self.studied_at)?,
            duration_minutes,
            focus_level,
            notes: self.notes,
        })
    }
}

const SELECT_FILTERED: &str = "SELECT id, subject_name, subject_icon_url, studied_at, duration_minutes, focus_level, notes
     FROM study_sessions
     WHERE (?1 IS NULL OR subject_name = ?1)
       AND (?2 IS NULL OR focus_level >= ?2)
       AND (?3 IS NULL OR focus_level <= ?3)
       AND (?4 IS NULL OR studied_at >= ?4)
       AND (?5 IS NULL OR studied_at <= ?5)
       AND (?6 IS NULL OR notes LIKE '%' || ?6 || '%' ESCAPE '\\')
     ORDER BY studied_at DESC, id DESC";

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db_path: PathBuf,
}

impl SqliteSessionStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl SessionStore for SqliteSessionStore {
    fn list_all(&self) -> Result<Vec<StudySession>, InfraError> {
        self.list_filtered(&SessionFilter::default())
    }

    fn list_filtered(&self, filter: &SessionFilter) -> Result<Vec<StudySession>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(SELECT_FILTERED)?;
        let rows = statement.query_map(
            params![
                filter.subject,
                filter.min_focus,
                filter.max_focus,
                filter.start.map(format_instant),
                filter.end.map(format_instant),
                filter.search_query.as_deref().map(escape_like),
            ],
            |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    subject_name: row.get(1)?,
                    subject_icon_url: row.get(2)?,
                    studied_at: row.get(3)?,
                    duration_minutes: row.get(4)?,
                    focus_level: row.get(5)?,
                    notes: row.get(6)?,
                })
            },
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn insert(&self, session: &NewStudySession) -> Result<StudySession, InfraError> {
        let session = validated(session)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO study_sessions
               (subject_name, subject_icon_url, studied_at, duration_minutes, focus_level, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.subject_name,
                session.subject_icon_url,
                format_instant(session.studied_at),
                session.duration_minutes,
                session.focus_level,
                session.notes,
            ],
        )?;
        let id = connection.last_insert_rowid();
        Ok(session.into_session(id))
    }

    fn delete(&self, id: i64) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let affected = connection.execute("DELETE FROM study_sessions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

#[derive(Debug, Default)]
struct InMemorySessions {
    last_id: i64,
    sessions: Vec<StudySession>,
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    state: Mutex<InMemorySessions>,
}

impl InMemorySessionStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemorySessions>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Store(format!("session store lock poisoned: {error}")))
    }
}

impl SessionStore for InMemorySessionStore {
    fn list_all(&self) -> Result<Vec<StudySession>, InfraError> {
        self.list_filtered(&SessionFilter::default())
    }

    fn list_filtered(&self, filter: &SessionFilter) -> Result<Vec<StudySession>, InfraError> {
        let state = self.lock()?;
        let mut sessions: Vec<StudySession> = state
            .sessions
            .iter()
            .filter(|session| filter.matches(session))
            .cloned()
            .collect();
        sessions.sort_by(|left, right| {
            right
                .studied_at
                .cmp(&left.studied_at)
                .then(right.id.cmp(&left.id))
        });
        Ok(sessions)
    }

    fn insert(&self, session: &NewStudySession) -> Result<StudySession, InfraError> {
        let session = validated(session)?;
        let mut state = self.lock()?;
        state.last_id += 1;
        let stored = session.into_session(state.last_id);
        state.sessions.push(stored.clone());
        Ok(stored)
    }

    fn delete(&self, id: i64) -> Result<bool, InfraError> {
        let mut state = self.lock()?;
        let before = state.sessions.len();
        state.sessions.retain(|session| session.id != id);
        Ok(state.sessions.len() != before)
    }
}
