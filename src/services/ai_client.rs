//! Client for the generative-model API (Gemini `generateContent`).
//!
//! Provides typed drafting methods:
//! - Contact draft from free text
//! - Product draft from a description
//! - Brand name suggestions
//! - Devis draft from a job description
//!
//! Transient failures (transport errors, 429, 5xx) are retried with
//! exponential backoff, at most `max_retries` times.

use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::ai_output::{self, AiOutputError, MAX_BRAND_SUGGESTIONS};
use super::prompts::{self, CatalogueEntry};
use crate::config::Settings;
use crate::domain::ai::{BrandSuggestions, ContactDraft, DevisDraft, ProductDraft};
use crate::error::ApiError;

/// Failure talking to the model
#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {message}")]
    Http { status: StatusCode, message: String },
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("model returned no text")]
    Empty,
    #[error(transparent)]
    Output(#[from] AiOutputError),
}

impl AiClientError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

impl From<AiClientError> for ApiError {
    fn from(e: AiClientError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                response_mime_type: "application/json",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String, AiClientError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AiClientError::Blocked(reason));
        }

        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiClientError::Empty);
        }
        Ok(text)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client for the generative-model API.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    generate_url: Url,
    model_url: Url,
    api_key: String,
    max_retries: u32,
    timeout: Duration,
}

fn model_urls(base_url: &str, model: &str) -> Result<(Url, Url)> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
        .with_context(|| format!("Invalid AI_API_URL: {}", base_url))?;
    let model_url = base
        .join(&format!("v1beta/models/{}", model))
        .context("Invalid AI model name")?;
    let generate_url = base
        .join(&format!("v1beta/models/{}:generateContent", model))
        .context("Invalid AI model name")?;
    Ok((generate_url, model_url))
}

impl AiClient {
    /// Create a new client from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai_timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let (generate_url, model_url) = model_urls(&settings.ai_api_url, &settings.ai_model)?;

        tracing::info!(model = %settings.ai_model, "AI client initialized");

        Ok(Self {
            client,
            generate_url,
            model_url,
            api_key: settings.ai_api_key.clone(),
            max_retries: settings.ai_max_retries,
            timeout,
        })
    }

    async fn generate_once(
        &self,
        body: &GenerateRequest<'_>,
        request_id: Option<&str>,
    ) -> Result<String, AiClientError> {
        let mut req = self
            .client
            .post(self.generate_url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(body);

        if let Some(rid) = request_id {
            req = req.header("x-request-id", rid);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AiClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(AiClientError::Http { status, message });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| AiClientError::Transport(format!("invalid response body: {}", e)))?
            .into_text()
    }

    /// Send a prompt and return the model's raw text.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn generate_text(
        &self,
        prompt: &str,
        request_id: Option<&str>,
    ) -> Result<String, AiClientError> {
        let body = GenerateRequest::new(prompt);
        let body = &body;
        let max_retries = self.max_retries;
        let mut attempt: u32 = 0;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(8))
            .with_max_elapsed_time(Some(self.timeout * (max_retries + 1)))
            .build();

        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.generate_once(body, request_id).await {
                    Ok(text) => {
                        debug!(attempt = current, chars = text.len(), "AI response received");
                        Ok(text)
                    }
                    Err(e) if e.is_transient() && current <= max_retries => {
                        warn!(attempt = current, error = %e, "AI request failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => {
                        error!(attempt = current, error = %e, "AI request failed");
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await
    }

    /// Prompt the model and recover the JSON object from its answer.
    async fn generate_object(
        &self,
        prompt: &str,
        request_id: Option<&str>,
    ) -> Result<ai_output::JsonObject, AiClientError> {
        let text = self.generate_text(prompt, request_id).await?;
        ai_output::extract_json_object(&text).map_err(|e| {
            warn!(error = %e, "Unusable AI output");
            AiClientError::Output(e)
        })
    }

    /// Check the configured model is reachable.
    pub async fn health_check(&self) -> Result<()> {
        self.client
            .get(self.model_url.clone())
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("AI API health check failed")?
            .error_for_status()
            .context("AI API unhealthy")?;

        Ok(())
    }

    // =========================================================================
    // Drafting
    // =========================================================================

    #[instrument(skip(self, description))]
    pub async fn draft_contact(
        &self,
        description: &str,
        request_id: Option<&str>,
    ) -> Result<ContactDraft, AiClientError> {
        let map = self
            .generate_object(&prompts::contact_prompt(description), request_id)
            .await?;
        Ok(ai_output::contact_draft(&map)?)
    }

    #[instrument(skip(self, description, brands, categories))]
    pub async fn draft_product(
        &self,
        description: &str,
        brands: &[String],
        categories: &[String],
        request_id: Option<&str>,
    ) -> Result<ProductDraft, AiClientError> {
        let prompt = prompts::product_prompt(description, brands, categories);
        let map = self.generate_object(&prompt, request_id).await?;
        Ok(ai_output::product_draft(&map)?)
    }

    #[instrument(skip(self, description, existing))]
    pub async fn suggest_brands(
        &self,
        description: &str,
        count: usize,
        existing: &[String],
        request_id: Option<&str>,
    ) -> Result<BrandSuggestions, AiClientError> {
        let count = count.clamp(1, MAX_BRAND_SUGGESTIONS);
        let prompt = prompts::brand_prompt(description, count, existing);
        let map = self.generate_object(&prompt, request_id).await?;
        Ok(ai_output::brand_suggestions(&map, count)?)
    }

    #[instrument(skip(self, description, catalogue))]
    pub async fn draft_devis(
        &self,
        description: &str,
        contact_name: &str,
        currency: &str,
        catalogue: &[CatalogueEntry],
        request_id: Option<&str>,
    ) -> Result<DevisDraft, AiClientError> {
        let prompt = prompts::devis_prompt(description, contact_name, currency, catalogue);
        let map = self.generate_object(&prompt, request_id).await?;
        Ok(ai_output::devis_draft(&map)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls_are_built_from_base_and_model() {
        let (generate, model) =
            model_urls("https://generativelanguage.googleapis.com/", "gemini-1.5-flash").unwrap();
        assert_eq!(
            generate.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(
            model.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash"
        );
        assert!(model_urls("not a url", "m").is_err());
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GenerateRequest::new("Bonjour")).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Bonjour");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn response_text_is_joined_across_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": " 1}" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn blocked_and_empty_responses() {
        let blocked: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert!(matches!(blocked.into_text(), Err(AiClientError::Blocked(r)) if r == "SAFETY"));

        let empty: GenerateResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(matches!(empty.into_text(), Err(AiClientError::Empty)));
    }

    #[test]
    fn only_transport_throttling_and_server_errors_are_retried() {
        let http = |status| AiClientError::Http {
            status,
            message: String::new(),
        };
        assert!(AiClientError::Transport("reset".into()).is_transient());
        assert!(http(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(http(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(!http(StatusCode::BAD_REQUEST).is_transient());
        assert!(!http(StatusCode::FORBIDDEN).is_transient());
        assert!(!AiClientError::Empty.is_transient());
        assert!(!AiClientError::Output(AiOutputError::NoJson).is_transient());
    }

    #[test]
    fn errors_map_to_bad_gateway() {
        let err: ApiError = AiClientError::Empty.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
