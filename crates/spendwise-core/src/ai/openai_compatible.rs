//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! OpenRouter, vLLM, LocalAI, llama-server and similar.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Base URL including the API version path
//!   (default: `https://openrouter.ai/api/v1` when an API key is set)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: amazon/nova-2-lite-v1:free)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key, sent as a bearer token
//! - `OPENAI_COMPATIBLE_TIMEOUT_SECS`: Per-request timeout (default: 30)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::parsing::{parse_insight_items, parse_insight_strings, parse_suggestions};
use super::prompt::{categorization_prompt, recurring_insights_prompt, spending_insights_prompt};
use super::types::{
    InsightItem, MerchantContext, MerchantSuggestion, RecurringOverview, SpendingOverview,
};
use super::AIBackend;

/// Default base URL when only an API key is configured
pub const DEFAULT_HOST: &str = "https://openrouter.ai/api/v1";
/// Default model name
pub const DEFAULT_MODEL: &str = "amazon/nova-2-lite-v1:free";
/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// OpenAI-compatible backend
///
/// Posts to `{base_url}/chat/completions`. The HTTP client carries the
/// timeout, so a hung provider fails the attempt instead of the request.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new backend with the default timeout
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a backend with an explicit request timeout
    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Create from environment variables
    ///
    /// Returns None when neither `OPENAI_COMPATIBLE_HOST` nor
    /// `OPENAI_COMPATIBLE_API_KEY` is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let host = match std::env::var("OPENAI_COMPATIBLE_HOST") {
            Ok(host) => host,
            Err(_) if api_key.is_some() => DEFAULT_HOST.to_string(),
            Err(_) => return None,
        };
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout = std::env::var("OPENAI_COMPATIBLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut backend = Self::with_timeout(&host, &model, Duration::from_secs(timeout));
        backend.api_key = api_key;
        Some(backend)
    }

    /// Classify a transport failure
    ///
    /// Refused connections and timeouts mean the provider is unreachable,
    /// which stops retries. Anything else stays an HTTP error.
    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_connect() || err.is_timeout() {
            Error::ProviderUnavailable(format!("{}: {}", self.base_url, err))
        } else {
            Error::Http(err)
        }
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(0.1),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::InvalidData("No response from OpenAI API".into()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn categorize_merchants(
        &self,
        merchants: &[MerchantContext],
        categories: &[String],
    ) -> Result<Vec<MerchantSuggestion>> {
        if merchants.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = categorization_prompt(merchants, categories);
        debug!(
            model = %self.model,
            merchants = merchants.len(),
            "Requesting merchant categorization"
        );

        let response = self.chat_completion(&prompt).await.map_err(|e| {
            warn!(error = %e, "Categorization request failed");
            e
        })?;
        parse_suggestions(&response)
    }

    async fn spending_insights(&self, overview: &SpendingOverview) -> Result<Vec<String>> {
        let prompt = spending_insights_prompt(overview);
        debug!(model = %self.model, "Requesting spending insights");
        let response = self.chat_completion(&prompt).await?;
        parse_insight_strings(&response)
    }

    async fn recurring_insights(&self, overview: &RecurringOverview) -> Result<Vec<InsightItem>> {
        let prompt = recurring_insights_prompt(overview);
        debug!(
            model = %self.model,
            payments = overview.payments.len(),
            "Requesting recurring insights"
        );
        let response = self.chat_completion(&prompt).await?;
        parse_insight_items(&response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
