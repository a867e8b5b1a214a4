use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_feed_client::DEFAULT_FEED_BASE_URL;
use crate::infrastructure::text_generation_client::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use chrono_tz::Tz;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "Study Tracker";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_TIP_LANGUAGE: &str = "Vietnamese";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiSettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub tip_language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub app_name: String,
    pub timezone: Tz,
    pub feed: FeedSettings,
    pub ai: AiSettings,
}

fn default_app_config() -> Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "timezone": "UTC",
        "feed": {
            "baseUrl": DEFAULT_FEED_BASE_URL,
            "timeoutSeconds": DEFAULT_TIMEOUT_SECONDS
        },
        "ai": {
            "enabled": true,
            "baseUrl": DEFAULT_GEMINI_BASE_URL,
            "model": DEFAULT_GEMINI_MODEL,
            "timeoutSeconds": DEFAULT_TIMEOUT_SECONDS,
            "tipLanguage": DEFAULT_TIP_LANGUAGE
        }
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn string_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn timeout_at(value: &Value, pointer: &str) -> Result<Duration, InfraError> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
        Some(raw) => raw
            .as_u64()
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("{pointer} must be a positive integer, got {raw}"))
            }),
    }
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{value}': {error}")))
}

pub fn load_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;

    let timezone = string_at(&app, "/timezone").map_or(Ok(Tz::UTC), parse_timezone)?;
    let feed = FeedSettings {
        base_url: string_at(&app, "/feed/baseUrl")
            .unwrap_or(DEFAULT_FEED_BASE_URL)
            .to_string(),
        timeout: timeout_at(&app, "/feed/timeoutSeconds")?,
    };
    let ai = AiSettings {
        enabled: app
            .pointer("/ai/enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        base_url: string_at(&app, "/ai/baseUrl")
            .unwrap_or(DEFAULT_GEMINI_BASE_URL)
            .to_string(),
        model: string_at(&app, "/ai/model")
            .unwrap_or(DEFAULT_GEMINI_MODEL)
            .to_string(),
        timeout: timeout_at(&app, "/ai/timeoutSeconds")?,
        tip_language: string_at(&app, "/ai/tipLanguage")
            .unwrap_or(DEFAULT_TIP_LANGUAGE)
            .to_string(),
    };

    Ok(AppSettings {
        app_name: string_at(&app, "/appName")
            .unwrap_or(DEFAULT_APP_NAME)
            .to_string(),
        timezone,
        feed,
        ai,
    })
}
