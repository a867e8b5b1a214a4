use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_mapper::ExternalSessionRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FEED_BASE_URL: &str = "https://687319aac75558e273535336.mockapi.io/api/";
const SESSIONS_PATH: &str = "subjects";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalFeedBatch {
    pub records: Vec<ExternalSessionRecord>,
    pub malformed: usize,
}

#[async_trait]
pub trait SessionFeedClient: Send + Sync {
    async fn fetch_sessions(&self) -> Result<ExternalFeedBatch, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSessionFeedClient {
    client: Client,
    endpoint: Url,
}

impl ReqwestSessionFeedClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Feed(format!("failed to build http client: {error}")))?;
        Ok(Self {
            client,
            endpoint: sessions_endpoint(base_url)?,
        })
    }
}

fn sessions_endpoint(base_url: &str) -> Result<Url, InfraError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig("feed.baseUrl must not be empty".to_string()));
    }
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized)
        .and_then(|base| base.join(SESSIONS_PATH))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid feed.baseUrl '{trimmed}': {error}")))
}

fn feed_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
    let message = if body.trim().is_empty() {
        format!("session feed error: http {}", status.as_u16())
    } else {
        format!("session feed error: http {}; body={body}", status.as_u16())
    };
    InfraError::Feed(message)
}

pub fn parse_feed_payload(body: &str) -> Result<ExternalFeedBatch, InfraError> {
    let entries: Vec<Value> = serde_json::from_str(body)
        .map_err(|error| InfraError::Feed(format!("invalid session feed payload: {error}; body={body}")))?;

    let mut batch = ExternalFeedBatch::default();
    for entry in entries {
        match serde_json::from_value::<ExternalSessionRecord>(entry) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                tracing::debug!(%error, "skipping malformed feed entry");
                batch.malformed += 1;
            }
        }
    }
    Ok(batch)
}

#[async_trait]
impl SessionFeedClient for ReqwestSessionFeedClient {
    async fn fetch_sessions(&self) -> Result<ExternalFeedBatch, InfraError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|error| InfraError::Feed(format!("network error while fetching sessions: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Feed(format!("failed reading session feed response: {error}")))?;

        if !status.is_success() {
            return Err(feed_http_error(status, &body));
        }

        parse_feed_payload(&body)
    }
}
