//! Test utilities for spendwise-core
//!
//! - `MockProviderServer`: a local OpenAI-compatible chat-completions server,
//!   so the HTTP provider path can be tested without network access
//! - `MemoryCache`: an in-memory `MerchantCategorizationCache`

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::cache::MerchantCategorizationCache;
use crate::db::CacheSuggestion;
use crate::error::Result;
use crate::models::MerchantCacheEntry;

#[derive(Default)]
struct ProviderState {
    /// Fixed assistant content; None derives answers from the prompt
    content: Option<String>,
    failing: bool,
    requests: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
}

/// Mock OpenAI-compatible server for testing
pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<ProviderState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start a server that answers every merchant in the prompt with "Other"
    /// (or "Subscription" for NETFLIX keys)
    pub async fn start() -> Self {
        Self::start_with_state(ProviderState::default()).await
    }

    /// Start a server that always replies with `content` as the assistant text
    pub async fn start_with_content(content: &str) -> Self {
        Self::start_with_state(ProviderState {
            content: Some(content.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Start a server that answers every request with a 500
    pub async fn start_failing() -> Self {
        Self::start_with_state(ProviderState {
            failing: true,
            ..Default::default()
        })
        .await
    }

    async fn start_with_state(state: ProviderState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/models", get(handle_models))
            .route("/chat/completions", post(handle_chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of chat completion requests received
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Authorization header of the most recent chat completion request
    pub fn last_authorization(&self) -> Option<String> {
        self.state
            .last_authorization
            .lock()
            .ok()
            .and_then(|a| a.clone())
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    index: u32,
    message: ChatMessage,
}

async fn handle_models(State(state): State<Arc<ProviderState>>) -> Response {
    if state.failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "test-model", "object": "model"}]
    }))
    .into_response()
}

async fn handle_chat(
    State(state): State<Arc<ProviderState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut auth) = state.last_authorization.lock() {
        *auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }

    if state.failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "provider exploded").into_response();
    }

    let prompt = request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let content = match &state.content {
        Some(content) => content.clone(),
        None => answer_from_prompt(prompt),
    };

    Json(ChatResponse {
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
        }],
    })
    .into_response()
}

/// Answer every `merchant_key: X,` line found in the prompt
fn answer_from_prompt(prompt: &str) -> String {
    let suggestions: Vec<serde_json::Value> = prompt
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("- merchant_key: ")?;
            let key = rest.split(',').next()?.trim();
            let category = if key.contains("NETFLIX") {
                "Subscription"
            } else {
                "Other"
            };
            Some(serde_json::json!({
                "merchant_key": key,
                "category": category,
                "note": "Mock",
                "confidence": "high",
            }))
        })
        .collect();
    serde_json::to_string(&suggestions).unwrap()
}

/// In-memory merchant cache for engine tests
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(i64, String), MerchantCacheEntry>>,
    next_id: AtomicUsize,
}

impl MemoryCache {
    /// Number of stored entries across all users
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MerchantCategorizationCache for MemoryCache {
    fn get(&self, user_id: i64, merchant_key: &str) -> Result<Option<MerchantCacheEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(user_id, merchant_key.to_string())).cloned())
    }

    fn put(
        &self,
        user_id: i64,
        merchant_key: &str,
        suggestion: &CacheSuggestion,
    ) -> Result<MerchantCacheEntry> {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        let entry = entries
            .entry((user_id, merchant_key.to_string()))
            .or_insert_with(|| MerchantCacheEntry {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
                user_id,
                merchant_key: merchant_key.to_string(),
                suggested_category: String::new(),
                suggested_note: None,
                confidence: suggestion.confidence,
                explanation: None,
                created_at: now,
                last_used_at: now,
            });
        entry.suggested_category = suggestion.category.clone();
        entry.suggested_note = suggestion.note.clone();
        entry.confidence = suggestion.confidence;
        entry.explanation = suggestion.explanation.clone();
        entry.last_used_at = entry.last_used_at.max(now);
        Ok(entry.clone())
    }

    fn touch(&self, user_id: i64, merchant_key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&(user_id, merchant_key.to_string())) {
            Some(entry) => {
                entry.last_used_at = entry.last_used_at.max(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
