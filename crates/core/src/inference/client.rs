//! Inference client abstraction and the Gemini implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ledger::Credential;

/// Error type for inference calls, classified at the transport boundary
/// so callers never inspect provider error strings.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The credential's daily quota is exhausted (HTTP 429 class).
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The credential or its model no longer exists (HTTP 404 class).
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    /// Anything else: network failures, 5xx, malformed responses.
    #[error("transient inference failure: {0}")]
    Transient(String),
}

/// Trait for inference backends. The credential carries the API key and
/// model name; the service owns only the transport.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Run one prompt against the model named by `credential` and return
    /// the raw generated text.
    async fn infer(&self, credential: &Credential, prompt: &str)
        -> Result<String, InferenceError>;
}

// ============================================================================
// Gemini Implementation
// ============================================================================

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Google Gemini API client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn infer(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<String, InferenceError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base, credential.model_name
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &credential.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => InferenceError::QuotaExceeded,
                // Unknown model or revoked key. Other 4xx stay transient
                // since they may be prompt-specific.
                404 => InferenceError::CredentialInvalid(format!("{status}: {body}")),
                _ => InferenceError::Transient(format!("{status}: {body}")),
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Transient(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(InferenceError::Transient(
                "empty completion from provider".to_string(),
            ));
        }

        Ok(text)
    }
}
