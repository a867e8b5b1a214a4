use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[async_trait]
pub trait TextGenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGeminiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl ReqwestGeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InfraError::Credential("gemini api key must not be empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            InfraError::TextGeneration(format!("failed to build http client: {error}"))
        })?;
        Ok(Self {
            client,
            endpoint: generate_endpoint(base_url, model)?,
            api_key: api_key.to_string(),
        })
    }
}

fn generate_endpoint(base_url: &str, model: &str) -> Result<Url, InfraError> {
    let model = model.trim();
    if model.is_empty() {
        return Err(InfraError::InvalidConfig("ai.model must not be empty".to_string()));
    }
    let base = base_url.trim();
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized)
        .and_then(|base| base.join(&format!("v1beta/models/{model}:generateContent")))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid ai.baseUrl '{base}': {error}")))
}

#[derive(Debug, serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn extract_candidate_text(body: &str) -> Result<String, InfraError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::TextGeneration(format!("invalid generateContent payload: {error}; body={body}"))
    })?;

    let text = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(InfraError::TextGeneration(
            "generateContent response did not include text".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerationClient for ReqwestGeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, InfraError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                InfraError::TextGeneration(format!("network error while generating content: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::TextGeneration(format!("failed reading generateContent response: {error}"))
        })?;

        if !status.is_success() {
            return Err(InfraError::TextGeneration(format!(
                "gemini api error: http {}; body={body}",
                status.as_u16()
            )));
        }

        extract_candidate_text(&body)
    }
}
