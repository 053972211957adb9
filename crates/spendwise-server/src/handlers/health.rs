//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};
use spendwise_core::ai::AIBackend;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub ai_configured: bool,
    /// Live check against the provider; false when none is configured
    pub ai_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
}

/// GET /api/health - Server and AI provider status
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthStatus>, AppError> {
    let mut status = HealthStatus {
        status: "ok",
        ai_configured: false,
        ai_available: false,
        ai_host: None,
        ai_model: None,
    };

    if let Some(ref client) = state.ai {
        status.ai_configured = true;
        status.ai_available = client.health_check().await;
        status.ai_host = Some(client.host().to_string());
        status.ai_model = Some(client.model().to_string());
    }

    Ok(Json(status))
}
