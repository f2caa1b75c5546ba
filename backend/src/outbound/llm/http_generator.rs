//! Reqwest-backed text generator adapter.
//!
//! This adapter owns transport details only: request serialisation, HTTP
//! status mapping and response decoding. Retries and the per-attempt timeout
//! belong to the domain generation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use zeroize::Zeroizing;

use super::dto::{MessagesRequestDto, MessagesResponseDto};
use crate::domain::ports::{TextGenerator, TextGeneratorError};
use crate::domain::story_generation::StoryPrompt;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_USER_AGENT: &str = "story-backend/0.1";

/// Connection and sampling settings for the messages endpoint.
pub struct HttpTextGeneratorSettings {
    /// Messages endpoint URL.
    pub endpoint: Url,
    /// Model identifier sent with each request.
    pub model: String,
    /// API key sent in the `x-api-key` header.
    pub api_key: Zeroizing<String>,
    /// Transport-level request timeout.
    pub request_timeout: Duration,
    /// Maximum tokens per segment.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Text generator that POSTs prompts to one messages endpoint.
pub struct HttpTextGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Zeroizing<String>,
    max_tokens: u32,
    temperature: f32,
}

impl HttpTextGenerator {
    /// Build an adapter with a reqwest client bounded by the request timeout.
    /// ```rust,ignore
    /// let generator = HttpTextGenerator::new(settings)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(settings: HttpTextGeneratorSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint,
            model: settings.model,
            api_key: settings.api_key,
            max_tokens: settings.max_tokens.max(1),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &StoryPrompt) -> Result<String, TextGeneratorError> {
        let body =
            MessagesRequestDto::user_prompt(&self.model, self.max_tokens, self.temperature, prompt.text());
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-api-key", self.api_key.trim())
            .header("anthropic-version", API_VERSION)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let payload = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, payload.as_ref()));
        }
        parse_text(payload.as_ref())
    }
}

fn parse_text(body: &[u8]) -> Result<String, TextGeneratorError> {
    let decoded: MessagesResponseDto = serde_json::from_slice(body).map_err(|error| {
        TextGeneratorError::decode(format!("invalid messages JSON payload: {error}"))
    })?;
    if decoded.stop_reason.as_deref() == Some("refusal") {
        return Err(TextGeneratorError::rejected("model refused the prompt"));
    }
    decoded
        .into_text()
        .ok_or_else(|| TextGeneratorError::decode("response carried no text content"))
}

fn map_transport_error(error: reqwest::Error) -> TextGeneratorError {
    if error.is_timeout() {
        TextGeneratorError::timeout(error.to_string())
    } else {
        TextGeneratorError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> TextGeneratorError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), preview)
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => TextGeneratorError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TextGeneratorError::timeout(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TextGeneratorError::rejected(message),
        _ if status.is_server_error() => TextGeneratorError::upstream(message),
        _ => TextGeneratorError::invalid_prompt(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        let head: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
        format!("{head}...")
    } else {
        compact
    }
}
