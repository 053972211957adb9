//! Pluggable AI categorization provider
//!
//! # Architecture
//!
//! - `AIBackend` trait: the interface every provider implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env();
//!
//! if let Some(ref client) = ai {
//!     let suggestions = client.categorize_merchants(&merchants, &categories).await?;
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, mock). Default: openai_compatible
//! - `OPENAI_COMPATIBLE_*`: see [`openai_compatible`]

mod mock;
pub mod openai_compatible;
pub mod parsing;
pub mod prompt;
pub mod types;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Suggest a category for each merchant
    ///
    /// Merchants the provider could not answer for are simply absent from the
    /// returned list. An `Err` means the whole call failed.
    async fn categorize_merchants(
        &self,
        merchants: &[MerchantContext],
        categories: &[String],
    ) -> Result<Vec<MerchantSuggestion>>;

    /// Write short narrative insights about a spending period
    async fn spending_insights(&self, overview: &SpendingOverview) -> Result<Vec<String>>;

    /// Write titled insights about the user's recurring payments
    async fn recurring_insights(&self, overview: &RecurringOverview) -> Result<Vec<InsightItem>>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible backend (OpenRouter, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `openai_compatible` (default): uses the `OPENAI_COMPATIBLE_*` variables
    /// - `mock`: creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "openrouter" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an OpenAI-compatible backend directly
    pub fn openai_compatible(host: &str, model: &str) -> Self {
        AIClient::OpenAICompatible(OpenAICompatibleBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn categorize_merchants(
        &self,
        merchants: &[MerchantContext],
        categories: &[String],
    ) -> Result<Vec<MerchantSuggestion>> {
        match self {
            AIClient::OpenAICompatible(b) => b.categorize_merchants(merchants, categories).await,
            AIClient::Mock(b) => b.categorize_merchants(merchants, categories).await,
        }
    }

    async fn spending_insights(&self, overview: &SpendingOverview) -> Result<Vec<String>> {
        match self {
            AIClient::OpenAICompatible(b) => b.spending_insights(overview).await,
            AIClient::Mock(b) => b.spending_insights(overview).await,
        }
    }

    async fn recurring_insights(&self, overview: &RecurringOverview) -> Result<Vec<InsightItem>> {
        match self {
            AIClient::OpenAICompatible(b) => b.recurring_insights(overview).await,
            AIClient::Mock(b) => b.recurring_insights(overview).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
