use crate::application::aggregation::{
    current_week_window, end_of_local_day, last_seven_days_window, per_subject_durations,
    start_of_local_day, summarize,
};
use crate::application::ai_tips::{AiTipAdapter, tips_from_ai_lines};
use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::session_sync::{RetryPolicy, SessionSyncService, SyncReport};
use crate::application::subject_catalog::SubjectCatalogService;
use crate::application::tip_analyzer::analyze_study_patterns;
use crate::domain::models::{
    AggregateSummary, DEFAULT_FOCUS_LEVEL, MAX_FOCUS_LEVEL, MIN_FOCUS_LEVEL, NewStudySession,
    SessionFilter, StudySession, StudyTip, SubjectCatalogEntry, SubjectDuration, TimeWindow,
};
use crate::domain::subjects::icon_for;
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::credential_store::{ApiKeyStore, KeyringApiKeyStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_feed_client::{ReqwestSessionFeedClient, SessionFeedClient};
use crate::infrastructure::session_store::{SessionStore, SqliteSessionStore};
use crate::infrastructure::subject_cache::InMemorySubjectCacheRepository;
use crate::infrastructure::text_generation_client::{ReqwestGeminiClient, TextGenerationClient};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const GEMINI_API_KEY_ENV_KEYS: &[&str] = &["STUDY_TRACKER_GEMINI_API_KEY", "GEMINI_API_KEY"];

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn SessionStore>,
    pub feed: Arc<dyn SessionFeedClient>,
    pub text_generator: Option<Arc<dyn TextGenerationClient>>,
}

impl ServiceContext {
    pub fn from_settings(
        database_path: &Path,
        settings: &AppSettings,
        api_key: Option<String>,
    ) -> Result<Self, InfraError> {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(database_path));
        let feed: Arc<dyn SessionFeedClient> = Arc::new(ReqwestSessionFeedClient::new(
            &settings.feed.base_url,
            settings.feed.timeout,
        )?);
        let text_generator = match api_key.filter(|_| settings.ai.enabled) {
            Some(api_key) => Some(Arc::new(ReqwestGeminiClient::new(
                &settings.ai.base_url,
                &settings.ai.model,
                &api_key,
                settings.ai.timeout,
            )?) as Arc<dyn TextGenerationClient>),
            None => None,
        };

        Ok(Self {
            store,
            feed,
            text_generator,
        })
    }
}

pub struct AppState {
    logs_dir: PathBuf,
    settings: AppSettings,
    services: ServiceContext,
    api_key_store: Arc<dyn ApiKeyStore>,
    subject_cache: Arc<InMemorySubjectCacheRepository>,
    retry_policy: RetryPolicy,
    changes: watch::Sender<u64>,
    dashboard_generation: AtomicU64,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let api_key_store: Arc<dyn ApiKeyStore> = Arc::new(KeyringApiKeyStore::default());
        let api_key = if bootstrap.settings.ai.enabled {
            match load_gemini_api_key_from_lookup(
                |key| std::env::var(key).ok(),
                api_key_store.as_ref(),
            ) {
                Ok(api_key) => api_key,
                Err(error) => {
                    tracing::warn!(%error, "gemini api key unavailable; using heuristic tips only");
                    None
                }
            }
        } else {
            None
        };
        let services =
            ServiceContext::from_settings(&bootstrap.database_path, &bootstrap.settings, api_key)?;
        Ok(Self::from_bootstrap(bootstrap, services).with_api_key_store(api_key_store))
    }

    pub fn with_services(workspace_root: PathBuf, services: ServiceContext) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::from_bootstrap(bootstrap, services))
    }

    fn from_bootstrap(bootstrap: BootstrapResult, services: ServiceContext) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            logs_dir: bootstrap.logs_dir,
            settings: bootstrap.settings,
            services,
            api_key_store: Arc::new(KeyringApiKeyStore::default()),
            subject_cache: Arc::new(InMemorySubjectCacheRepository::default()),
            retry_policy: RetryPolicy::default(),
            changes,
            dashboard_generation: AtomicU64::new(0),
            now_provider: Arc::new(Utc::now),
            log_guard: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_api_key_store(mut self, api_key_store: Arc<dyn ApiKeyStore>) -> Self {
        self.api_key_store = api_key_store;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn ai_enabled(&self) -> bool {
        self.services.text_generator.is_some()
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn subject_catalog(
        &self,
    ) -> SubjectCatalogService<dyn SessionFeedClient, InMemorySubjectCacheRepository> {
        SubjectCatalogService::new(Arc::clone(&self.services.feed), Arc::clone(&self.subject_cache))
            .with_retry_policy(self.retry_policy.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilterRequest {
    pub subject: Option<String>,
    pub min_focus: Option<u8>,
    pub max_focus: Option<u8>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TipSource {
    Ai,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TipsResponse {
    pub source: TipSource,
    pub tips: Vec<StudyTip>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSnapshot {
    pub revision: u64,
    pub summary: AggregateSummary,
    pub weekly_breakdown: Vec<SubjectDuration>,
    pub tips: TipsResponse,
}

pub async fn sync_external_to_local_impl(state: &AppState) -> Result<SyncReport, InfraError> {
    let service = SessionSyncService::new(
        Arc::clone(&state.services.feed),
        Arc::clone(&state.services.store),
    )
    .with_timezone(state.settings.timezone)
    .with_retry_policy(state.retry_policy.clone());

    let report = service.sync().await?;
    if report.inserted > 0 {
        state.notify_changed();
    }
    state.log_info(
        "sync_external_to_local",
        &format!(
            "inserted={} skipped_invalid={} skipped_duplicate={} failed_inserts={}",
            report.inserted, report.skipped_invalid, report.skipped_duplicate, report.failed_inserts
        ),
    );
    Ok(report)
}

pub async fn refresh_subject_catalog_impl(
    state: &AppState,
) -> Result<Vec<SubjectCatalogEntry>, InfraError> {
    let entries = state.subject_catalog().refresh().await?;
    state.log_info(
        "refresh_subject_catalog",
        &format!("subjects={}", entries.len()),
    );
    Ok(entries)
}

pub async fn list_subjects_impl(state: &AppState) -> Result<Vec<SubjectCatalogEntry>, InfraError> {
    state.subject_catalog().subjects().await
}

pub fn list_sessions_impl(
    state: &AppState,
    request: SessionFilterRequest,
) -> Result<Vec<StudySession>, InfraError> {
    let tz = state.settings.timezone;
    let min_focus = validate_focus_bound(request.min_focus, "min_focus")?;
    let max_focus = validate_focus_bound(request.max_focus, "max_focus")?;
    if let (Some(min), Some(max)) = (min_focus, max_focus) {
        if min > max {
            return Err(InfraError::InvalidConfig(
                "min_focus must not be greater than max_focus".to_string(),
            ));
        }
    }

    let start = non_blank(request.start)
        .map(|raw| parse_datetime_input(&raw, "start", tz, DayBound::Start))
        .transpose()?;
    let end = non_blank(request.end)
        .map(|raw| parse_datetime_input(&raw, "end", tz, DayBound::End))
        .transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        TimeWindow::new(start, end).map_err(InfraError::InvalidConfig)?;
    }

    let filter = SessionFilter {
        subject: non_blank(request.subject),
        min_focus,
        max_focus,
        start,
        end,
        search_query: non_blank(request.search_query),
    };
    state.services.store.list_filtered(&filter)
}

pub fn add_session_impl(
    state: &AppState,
    subject_name: String,
    studied_at: Option<String>,
    duration_minutes: u32,
    focus_level: Option<u8>,
    notes: Option<String>,
) -> Result<StudySession, InfraError> {
    let subject_name = subject_name.trim().to_string();
    let studied_at = match non_blank(studied_at) {
        Some(raw) => parse_datetime_input(&raw, "studied_at", state.settings.timezone, DayBound::Start)?,
        None => state.now(),
    };
    let session = NewStudySession {
        subject_icon_url: Some(icon_for(&subject_name).to_string()),
        subject_name,
        studied_at,
        duration_minutes,
        focus_level: focus_level.unwrap_or(DEFAULT_FOCUS_LEVEL),
        notes: non_blank(notes),
    };

    let stored = state.services.store.insert(&session)?;
    state.notify_changed();
    state.log_info(
        "add_session",
        &format!("id={} subject={}", stored.id, stored.subject_name),
    );
    Ok(stored)
}

pub fn delete_session_impl(state: &AppState, id: i64) -> Result<bool, InfraError> {
    let deleted = state.services.store.delete(id)?;
    if deleted {
        state.notify_changed();
    }
    state.log_info("delete_session", &format!("id={id} deleted={deleted}"));
    Ok(deleted)
}

pub fn compute_summary_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<AggregateSummary, InfraError> {
    let default_window = current_week_window(state.now(), state.settings.timezone);
    let window = resolve_window(state, start, end, default_window)?;
    let sessions = state.services.store.list_in_window(&window)?;
    Ok(summarize(&sessions, &window))
}

pub fn compute_weekly_breakdown_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<Vec<SubjectDuration>, InfraError> {
    let default_window = last_seven_days_window(state.now(), state.settings.timezone);
    let window = resolve_window(state, start, end, default_window)?;
    let sessions = state.services.store.list_in_window(&window)?;
    Ok(per_subject_durations(&sessions, &window))
}

pub async fn get_tips_impl(state: &AppState) -> Result<TipsResponse, InfraError> {
    let sessions = state.services.store.list_all()?;

    if let Some(generator) = &state.services.text_generator {
        let adapter = AiTipAdapter::new(Arc::clone(generator), state.settings.ai.tip_language.clone())
            .with_timezone(state.settings.timezone);
        match adapter.generate_tips(&sessions).await {
            Ok(lines) if !lines.is_empty() => {
                return Ok(TipsResponse {
                    source: TipSource::Ai,
                    tips: tips_from_ai_lines(&lines),
                });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "ai tips unavailable; falling back to heuristic analysis");
                state.log_error("get_tips", &format!("ai fallback: {error}"));
            }
        }
    }

    Ok(TipsResponse {
        source: TipSource::Heuristic,
        tips: analyze_study_patterns(&sessions, state.settings.timezone),
    })
}

/// Rebuilds the dashboard. Returns `None` when a newer reload started before this one finished.
pub async fn reload_dashboard_impl(state: &AppState) -> Result<Option<DashboardSnapshot>, InfraError> {
    let generation = state.dashboard_generation.fetch_add(1, Ordering::SeqCst) + 1;
    let revision = state.revision();

    let summary = compute_summary_impl(state, None, None)?;
    let weekly_breakdown = compute_weekly_breakdown_impl(state, None, None)?;
    let tips = get_tips_impl(state).await?;

    if state.dashboard_generation.load(Ordering::SeqCst) != generation {
        state.log_info(
            "reload_dashboard",
            &format!("generation={generation} superseded"),
        );
        return Ok(None);
    }
    Ok(Some(DashboardSnapshot {
        revision,
        summary,
        weekly_breakdown,
        tips,
    }))
}

/// The text generator is built at startup, so a new key takes effect on the next start.
pub fn save_gemini_api_key_impl(state: &AppState, api_key: String) -> Result<(), InfraError> {
    state.api_key_store.save_api_key(&api_key)?;
    state.log_info("save_gemini_api_key", "gemini api key stored");
    Ok(())
}

pub fn delete_gemini_api_key_impl(state: &AppState) -> Result<(), InfraError> {
    state.api_key_store.delete_api_key()?;
    state.log_info("delete_gemini_api_key", "gemini api key removed");
    Ok(())
}

pub fn load_gemini_api_key_from_lookup<F>(
    lookup: F,
    store: &dyn ApiKeyStore,
) -> Result<Option<String>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(api_key) = optional_lookup_value(&lookup, GEMINI_API_KEY_ENV_KEYS) {
        return Ok(Some(api_key));
    }
    store.load_api_key()
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn validate_focus_bound(value: Option<u8>, field_name: &str) -> Result<Option<u8>, InfraError> {
    match value {
        Some(level) if !(MIN_FOCUS_LEVEL..=MAX_FOCUS_LEVEL).contains(&level) => {
            Err(InfraError::InvalidConfig(format!(
                "{field_name} must be within {MIN_FOCUS_LEVEL}..={MAX_FOCUS_LEVEL}"
            )))
        }
        other => Ok(other),
    }
}

fn resolve_window(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
    default_window: TimeWindow,
) -> Result<TimeWindow, InfraError> {
    let tz = state.settings.timezone;
    let start = match non_blank(start) {
        Some(raw) => parse_datetime_input(&raw, "start", tz, DayBound::Start)?,
        None => default_window.start,
    };
    let end = match non_blank(end) {
        Some(raw) => parse_datetime_input(&raw, "end", tz, DayBound::End)?,
        None => default_window.end,
    };
    TimeWindow::new(start, end).map_err(InfraError::InvalidConfig)
}

#[derive(Debug, Clone, Copy)]
enum DayBound {
    Start,
    End,
}

fn parse_datetime_input(
    value: &str,
    field_name: &str,
    tz: Tz,
    bound: DayBound,
) -> Result<DateTime<Utc>, InfraError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(match bound {
            DayBound::Start => start_of_local_day(tz, date),
            DayBound::End => end_of_local_day(tz, date),
        });
    }
    Err(InfraError::InvalidConfig(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TipCategory;
    use crate::infrastructure::credential_store::InMemoryApiKeyStore;
    use crate::infrastructure::session_feed_client::ExternalFeedBatch;
    use crate::infrastructure::session_mapper::ExternalSessionRecord;
    use crate::infrastructure::session_store::InMemorySessionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "study-tracker-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn with_timezone(timezone: &str) -> Self {
            let workspace = Self::new();
            let config_dir = workspace.path.join("config");
            fs::create_dir_all(&config_dir).expect("create config dir");
            fs::write(
                config_dir.join("app.json"),
                json!({ "schema": 1, "timezone": timezone }).to_string(),
            )
            .expect("write app config");
            workspace
        }

        fn app_state(&self, services: ServiceContext) -> AppState {
            AppState::with_services(self.path.clone(), services)
                .expect("initialize app state")
                .with_retry_policy(RetryPolicy {
                    max_attempts: 1,
                    base_delay_ms: 1,
                })
                .with_now_provider(Arc::new(|| fixed_time("2025-07-16T10:00:00Z")))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[derive(Debug)]
    struct FakeSessionFeedClient {
        response: Result<Vec<ExternalSessionRecord>, String>,
        calls: AtomicUsize,
    }

    impl FakeSessionFeedClient {
        fn returning(records: Vec<ExternalSessionRecord>) -> Self {
            Self {
                response: Ok(records),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionFeedClient for FakeSessionFeedClient {
        async fn fetch_sessions(&self) -> Result<ExternalFeedBatch, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .map(|records| ExternalFeedBatch {
                    records,
                    malformed: 0,
                })
                .map_err(InfraError::Feed)
        }
    }

    #[derive(Debug)]
    struct FakeTextGenerationClient {
        response: Result<String, String>,
    }

    #[async_trait]
    impl TextGenerationClient for FakeTextGenerationClient {
        async fn generate(&self, _prompt: &str) -> Result<String, InfraError> {
            self.response.clone().map_err(InfraError::TextGeneration)
        }
    }

    #[derive(Debug, Default)]
    struct GatedTextGenerationClient {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerationClient for GatedTextGenerationClient {
        async fn generate(&self, _prompt: &str) -> Result<String, InfraError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
            } else {
                self.gate.notify_one();
            }
            Ok("1. Morning focus: Keep studying early".to_string())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn feed_record(id: &str, subject: &str, date: &str, minutes: i64, level: i64) -> ExternalSessionRecord {
        serde_json::from_value(json!({
            "id": id,
            "subject_name": subject,
            "subject_date": date,
            "duration": minutes,
            "level": level,
        }))
        .expect("valid feed record")
    }

    fn services(
        store: Arc<InMemorySessionStore>,
        feed: Arc<dyn SessionFeedClient>,
        text_generator: Option<Arc<dyn TextGenerationClient>>,
    ) -> ServiceContext {
        ServiceContext {
            store,
            feed,
            text_generator,
        }
    }

    fn offline_services(store: Arc<InMemorySessionStore>) -> ServiceContext {
        services(
            store,
            Arc::new(FakeSessionFeedClient::failing("network error while fetching sessions")),
            None,
        )
    }

    fn seed_week(state: &AppState) {
        for (subject, studied_at, minutes, focus) in [
            ("Math", "2025-07-14T09:00:00Z", 60, 4),
            ("Math", "2025-07-15T09:00:00Z", 30, 2),
            ("Physics", "2025-07-16T09:00:00Z", 90, 5),
        ] {
            add_session_impl(
                state,
                subject.to_string(),
                Some(studied_at.to_string()),
                minutes,
                Some(focus),
                None,
            )
            .expect("seed session");
        }
    }

    #[test]
    fn gemini_key_prefers_environment_over_credential_store() {
        let store = InMemoryApiKeyStore::default();
        store.save_api_key("stored-key").expect("save key");

        let from_env = load_gemini_api_key_from_lookup(
            |key| match key {
                "STUDY_TRACKER_GEMINI_API_KEY" => Some("   ".to_string()),
                "GEMINI_API_KEY" => Some(" env-key ".to_string()),
                _ => None,
            },
            &store,
        )
        .expect("lookup");
        assert_eq!(from_env.as_deref(), Some("env-key"));

        let from_store = load_gemini_api_key_from_lookup(|_| None, &store).expect("lookup");
        assert_eq!(from_store.as_deref(), Some("stored-key"));

        let missing =
            load_gemini_api_key_from_lookup(|_| None, &InMemoryApiKeyStore::default()).expect("lookup");
        assert_eq!(missing, None);
    }

    #[test]
    fn gemini_key_commands_write_through_credential_store() {
        let workspace = TempWorkspace::new();
        let key_store = Arc::new(InMemoryApiKeyStore::default());
        let key_store_handle: Arc<dyn ApiKeyStore> = key_store.clone();
        let state = workspace
            .app_state(offline_services(Arc::new(InMemorySessionStore::default())))
            .with_api_key_store(key_store_handle);

        let blank = save_gemini_api_key_impl(&state, "   ".to_string());
        assert!(matches!(blank, Err(InfraError::Credential(_))));

        save_gemini_api_key_impl(&state, " fresh-key ".to_string()).expect("save key");
        let loaded = load_gemini_api_key_from_lookup(|_| None, key_store.as_ref()).expect("load key");
        assert_eq!(loaded.as_deref(), Some("fresh-key"));

        delete_gemini_api_key_impl(&state).expect("delete key");
        delete_gemini_api_key_impl(&state).expect("delete missing key");
        assert_eq!(key_store.load_api_key().expect("load key"), None);
    }

    #[test]
    fn add_session_applies_defaults_and_bumps_revision() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(InMemorySessionStore::default());
        let state = workspace.app_state(offline_services(Arc::clone(&store)));
        let changes = state.subscribe_changes();

        let stored = add_session_impl(&state, "  Physics ".to_string(), None, 45, None, Some("  ".to_string()))
            .expect("add session");

        assert_eq!(stored.subject_name, "Physics");
        assert_eq!(stored.focus_level, DEFAULT_FOCUS_LEVEL);
        assert_eq!(stored.studied_at, fixed_time("2025-07-16T10:00:00Z"));
        assert_eq!(stored.subject_icon_url.as_deref(), Some(icon_for("Physics")));
        assert_eq!(stored.notes, None);
        assert_eq!(*changes.borrow(), 1);
        assert_eq!(store.list_all().expect("list").len(), 1);
    }

    #[test]
    fn add_session_rejects_invalid_input_without_notifying() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));

        let blank = add_session_impl(&state, "  ".to_string(), None, 30, None, None);
        let zero = add_session_impl(&state, "Math".to_string(), None, 0, None, None);
        let unfocused = add_session_impl(&state, "Math".to_string(), None, 30, Some(9), None);
        let bad_date =
            add_session_impl(&state, "Math".to_string(), Some("yesterday".to_string()), 30, None, None);

        assert!(matches!(blank, Err(InfraError::InvalidSession(_))));
        assert!(matches!(zero, Err(InfraError::InvalidSession(_))));
        assert!(matches!(unfocused, Err(InfraError::InvalidSession(_))));
        assert!(matches!(bad_date, Err(InfraError::InvalidConfig(_))));
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn list_sessions_applies_filter_request() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        seed_week(&state);
        add_session_impl(
            &state,
            "Chemistry".to_string(),
            Some("2025-07-10T09:00:00Z".to_string()),
            20,
            Some(3),
            Some("Titration 100% done".to_string()),
        )
        .expect("add session");

        let focused = list_sessions_impl(
            &state,
            SessionFilterRequest {
                min_focus: Some(4),
                ..SessionFilterRequest::default()
            },
        )
        .expect("list focused");
        let names: Vec<_> = focused.iter().map(|session| session.subject_name.as_str()).collect();
        assert_eq!(names, vec!["Physics", "Math"]);

        let searched = list_sessions_impl(
            &state,
            SessionFilterRequest {
                search_query: Some("TITRATION".to_string()),
                ..SessionFilterRequest::default()
            },
        )
        .expect("list searched");
        assert_eq!(searched.len(), 1);

        let by_day = list_sessions_impl(
            &state,
            SessionFilterRequest {
                start: Some("2025-07-15".to_string()),
                end: Some("2025-07-15".to_string()),
                ..SessionFilterRequest::default()
            },
        )
        .expect("list by day");
        assert_eq!(by_day.len(), 1);
        assert_eq!(by_day[0].duration_minutes, 30);
    }

    #[test]
    fn list_sessions_rejects_inconsistent_filters() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));

        let out_of_range = list_sessions_impl(
            &state,
            SessionFilterRequest {
                max_focus: Some(6),
                ..SessionFilterRequest::default()
            },
        );
        let inverted_focus = list_sessions_impl(
            &state,
            SessionFilterRequest {
                min_focus: Some(4),
                max_focus: Some(2),
                ..SessionFilterRequest::default()
            },
        );
        let inverted_window = list_sessions_impl(
            &state,
            SessionFilterRequest {
                start: Some("2025-07-16".to_string()),
                end: Some("2025-07-15".to_string()),
                ..SessionFilterRequest::default()
            },
        );

        assert!(matches!(out_of_range, Err(InfraError::InvalidConfig(_))));
        assert!(matches!(inverted_focus, Err(InfraError::InvalidConfig(_))));
        assert!(matches!(inverted_window, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn delete_session_reports_missing_ids() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        let stored = add_session_impl(&state, "Art".to_string(), None, 25, None, None).expect("add");

        assert!(!delete_session_impl(&state, stored.id + 100).expect("delete missing"));
        assert_eq!(state.revision(), 1);
        assert!(delete_session_impl(&state, stored.id).expect("delete"));
        assert_eq!(state.revision(), 2);
    }

    #[test]
    fn summary_defaults_to_current_week() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        seed_week(&state);
        add_session_impl(
            &state,
            "History".to_string(),
            Some("2025-07-12T09:00:00Z".to_string()),
            500,
            Some(1),
            None,
        )
        .expect("add last week");

        let summary = compute_summary_impl(&state, None, None).expect("summary");

        assert_eq!(summary.window_start, fixed_time("2025-07-13T00:00:00Z"));
        assert_eq!(summary.window_end, fixed_time("2025-07-16T23:59:59.999Z"));
        assert_eq!(summary.total_duration_minutes, 180);
        assert_eq!(summary.most_studied_subject.as_deref(), Some("Math"));
        assert!((summary.average_focus - 11.0 / 3.0).abs() < 1e-9);

        let explicit = compute_summary_impl(&state, Some("2025-07-12".to_string()), Some("2025-07-12".to_string()))
            .expect("explicit summary");
        assert_eq!(explicit.total_duration_minutes, 500);
    }

    #[test]
    fn date_arguments_use_configured_timezone() {
        let workspace = TempWorkspace::with_timezone("Asia/Ho_Chi_Minh");
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        // 2025-07-15T18:00Z is 01:00 on the 16th in Ho Chi Minh City.
        add_session_impl(
            &state,
            "Math".to_string(),
            Some("2025-07-15T18:00:00Z".to_string()),
            40,
            None,
            None,
        )
        .expect("add session");

        let sixteenth = compute_summary_impl(&state, Some("2025-07-16".to_string()), Some("2025-07-16".to_string()))
            .expect("summary");
        assert_eq!(sixteenth.window_start, fixed_time("2025-07-15T17:00:00Z"));
        assert_eq!(sixteenth.total_duration_minutes, 40);

        let fifteenth = compute_summary_impl(&state, Some("2025-07-15".to_string()), Some("2025-07-15".to_string()))
            .expect("summary");
        assert_eq!(fifteenth.total_duration_minutes, 0);
    }

    #[test]
    fn weekly_breakdown_covers_last_seven_days() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        seed_week(&state);
        add_session_impl(
            &state,
            "Physics".to_string(),
            Some("2025-07-08T23:00:00Z".to_string()),
            200,
            None,
            None,
        )
        .expect("add old session");

        let breakdown = compute_weekly_breakdown_impl(&state, None, None).expect("breakdown");

        assert_eq!(
            breakdown,
            vec![
                SubjectDuration {
                    subject_name: "Math".to_string(),
                    total_minutes: 90,
                },
                SubjectDuration {
                    subject_name: "Physics".to_string(),
                    total_minutes: 90,
                },
            ]
        );
    }

    #[tokio::test]
    async fn sync_inserts_once_and_notifies_only_on_change() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(InMemorySessionStore::default());
        let feed = Arc::new(FakeSessionFeedClient::returning(vec![
            feed_record("1", "Math", "2025-07-14T09:00:00.000Z", 60, 4),
            feed_record("2", "Physics", "2025-07-15T09:00:00.000Z", 45, 9),
            feed_record("3", "Art", "not a date", 30, 3),
        ]));
        let state = workspace.app_state(services(Arc::clone(&store), feed, None));

        let first = sync_external_to_local_impl(&state).await.expect("first sync");
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped_invalid, 1);
        assert_eq!(state.revision(), 1);

        let second = sync_external_to_local_impl(&state).await.expect("second sync");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicate, 2);
        assert_eq!(state.revision(), 1);

        let physics = store
            .list_all()
            .expect("list")
            .into_iter()
            .find(|session| session.subject_name == "Physics")
            .expect("physics session");
        assert_eq!(physics.focus_level, 5);
    }

    #[tokio::test]
    async fn failed_sync_surfaces_feed_error_and_leaves_store_untouched() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(InMemorySessionStore::default());
        let state = workspace.app_state(offline_services(Arc::clone(&store)));

        let result = sync_external_to_local_impl(&state).await;

        assert!(matches!(result, Err(InfraError::Feed(_))));
        assert!(store.list_all().expect("list").is_empty());
    }

    #[tokio::test]
    async fn subject_catalog_commands_use_cache() {
        let workspace = TempWorkspace::new();
        let feed = Arc::new(FakeSessionFeedClient::returning(vec![
            feed_record("1", "Physics", "2025-07-14T09:00:00.000Z", 60, 4),
            feed_record("2", "Art", "2025-07-15T09:00:00.000Z", 45, 3),
        ]));
        let feed_client: Arc<dyn SessionFeedClient> = feed.clone();
        let state = workspace.app_state(services(
            Arc::new(InMemorySessionStore::default()),
            feed_client,
            None,
        ));

        let listed = list_subjects_impl(&state).await.expect("list subjects");
        let again = list_subjects_impl(&state).await.expect("list subjects again");
        let refreshed = refresh_subject_catalog_impl(&state).await.expect("refresh");

        let names: Vec<_> = listed.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Art", "Physics"]);
        assert_eq!(listed, again);
        assert_eq!(listed, refreshed);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tips_prefer_ai_and_fall_back_to_heuristics() {
        let workspace = TempWorkspace::new();
        let store = Arc::new(InMemorySessionStore::default());
        let failing = workspace.app_state(services(
            Arc::clone(&store),
            Arc::new(FakeSessionFeedClient::failing("network error")),
            Some(Arc::new(FakeTextGenerationClient {
                response: Err("quota exceeded".to_string()),
            })),
        ));
        for day in 14..17 {
            add_session_impl(
                &failing,
                "Math".to_string(),
                Some(format!("2025-07-{day}T09:00:00Z")),
                60,
                Some(5),
                None,
            )
            .expect("seed session");
        }

        let heuristic = get_tips_impl(&failing).await.expect("heuristic tips");
        assert_eq!(heuristic.source, TipSource::Heuristic);
        assert_eq!(heuristic.tips.len(), 1);
        assert_eq!(heuristic.tips[0].category, TipCategory::TimePattern);

        let ai_state = AppState::with_services(
            workspace.path.clone(),
            services(
                Arc::clone(&store),
                Arc::new(FakeSessionFeedClient::failing("network error")),
                Some(Arc::new(FakeTextGenerationClient {
                    response: Ok("1. Keep mornings: Math sticks best before noon\n2. Rest well".to_string()),
                })),
            ),
        )
        .expect("ai state");
        let ai = get_tips_impl(&ai_state).await.expect("ai tips");
        assert_eq!(ai.source, TipSource::Ai);
        assert_eq!(ai.tips.len(), 2);
        assert_eq!(ai.tips[0].title, "Keep mornings");
        assert_eq!(ai.tips[1].rank, 2);
    }

    #[tokio::test]
    async fn reload_dashboard_returns_snapshot() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));
        seed_week(&state);

        let snapshot = reload_dashboard_impl(&state)
            .await
            .expect("reload")
            .expect("snapshot");

        assert_eq!(snapshot.revision, 3);
        assert_eq!(snapshot.summary.total_duration_minutes, 180);
        assert_eq!(snapshot.weekly_breakdown.len(), 2);
        assert_eq!(snapshot.tips.source, TipSource::Heuristic);
    }

    #[tokio::test]
    async fn newer_dashboard_reload_supersedes_inflight_one() {
        let workspace = TempWorkspace::new();
        let generator = Arc::new(GatedTextGenerationClient::default());
        let text_generator: Arc<dyn TextGenerationClient> = generator.clone();
        let state = workspace.app_state(services(
            Arc::new(InMemorySessionStore::default()),
            Arc::new(FakeSessionFeedClient::failing("network error")),
            Some(text_generator),
        ));
        seed_week(&state);

        let (first, second) = tokio::join!(reload_dashboard_impl(&state), reload_dashboard_impl(&state));

        assert_eq!(first.expect("first reload"), None);
        let latest = second.expect("second reload").expect("latest snapshot");
        assert_eq!(latest.tips.source, TipSource::Ai);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn command_outcomes_are_appended_to_log_file() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(offline_services(Arc::new(InMemorySessionStore::default())));

        add_session_impl(&state, "Biology".to_string(), None, 15, None, None).expect("add");
        let message = state.command_error(
            "sync_external_to_local",
            &InfraError::Feed("http 503".to_string()),
        );

        assert!(message.contains("http 503"));
        let log = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read command log");
        let lines: Vec<serde_json::Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).expect("json log line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["command"], "add_session");
        assert_eq!(lines[1]["level"], "error");
    }
}
