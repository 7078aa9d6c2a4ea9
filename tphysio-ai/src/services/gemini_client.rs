//! Gemini `generateContent` client
//!
//! `POST {base}/models/{model}:generateContent?key=...` with a single user
//! turn. Overload and rate-limit answers are classified as transient so the
//! analysis stage can back off inside the current model tier.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{ProviderError, TextGenerator};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini REST client
pub struct GeminiClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tphysio-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Permanent(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(model, prompt_chars = prompt.len(), "Requesting generation");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from_reqwest)?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        parse_generation(&body)
    }
}

/// Map a failed response; any mention of overload is transient regardless of status
pub fn classify_failure(status: u16, body: &str) -> ProviderError {
    match ProviderError::from_status(status, body) {
        ProviderError::Permanent(detail) if body.to_lowercase().contains("overloaded") => {
            ProviderError::Transient(detail)
        }
        other => other,
    }
}

/// Concatenate the text parts of the first candidate
pub fn parse_generation(body: &str) -> Result<String, ProviderError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Invalid generation response: {}", e)))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::Permanent(
            "Generation returned no text (empty or blocked candidate)".to_string(),
        ));
    }
    Ok(text)
}
