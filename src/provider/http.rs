//! OpenAI-compatible HTTP provider adapter.
//!
//! One concrete upstream integration. Any server speaking the
//! `/v1/completions` dialect (OpenAI, vLLM, llama.cpp server, most proxies)
//! can sit behind this adapter; everything provider-specific is normalized
//! into [`NormalizedResponse`] / [`ProviderError`] at this boundary.
//!
//! Credentials are resolved once at construction from an environment
//! variable named in configuration, so a missing key fails fast instead of
//! at the first routing call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::RouterError;

use super::{FinishReason, NormalizedResponse, ProviderAdapter, ProviderError};

/// Completion request payload (OpenAI-compatible).
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

/// Completion response payload (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    total_tokens: u64,
}

/// HTTP adapter for OpenAI-compatible completion endpoints.
///
/// ## Example
///
/// ```no_run
/// use tokio_provider_router::provider::HttpProvider;
///
/// let provider = HttpProvider::new("https://api.openai.com/v1/completions", "gpt-4o-mini")
///     .with_max_tokens(512)
///     .with_temperature(0.7);
/// ```
pub struct HttpProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl HttpProvider {
    /// Create an adapter for the given endpoint and model, without
    /// authentication.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    /// Attach a bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build an adapter from a [`ProviderConfig`] entry.
    ///
    /// Resolves the credential from the environment variable named by
    /// `credential_env`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when `credential_env` names a
    /// variable that is not set.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, RouterError> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let mut provider = Self::new(&config.endpoint, model);

        if let Some(var) = &config.credential_env {
            let key = std::env::var(var).map_err(|_| {
                RouterError::Config(format!(
                    "provider '{}': credential env var '{var}' not set",
                    config.name
                ))
            })?;
            provider = provider.with_api_key(key);
        }

        Ok(provider)
    }

    fn normalize(response: CompletionResponse) -> Result<NormalizedResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        };

        // Fall back to a whitespace-token estimate when the upstream omits
        // usage accounting.
        let cost_units = response
            .usage
            .map(|u| u.total_tokens)
            .unwrap_or_else(|| choice.text.split_whitespace().count() as u64);

        Ok(NormalizedResponse {
            text: choice.text,
            finish_reason,
            cost_units,
        })
    }
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<NormalizedResponse, ProviderError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).timeout(timeout).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Unavailable(format!("request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "upstream returned {status}: {body}"
            )));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("parse failed: {e}")))?;

        Self::normalize(payload)
    }
}
