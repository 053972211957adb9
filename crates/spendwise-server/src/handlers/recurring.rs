//! Recurring payment handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::{request_user, AppError, AppState};
use spendwise_core::models::{RecurringGroup, UpcomingPayment};
use spendwise_core::recurring::{RecurringDetector, RecurringSummary, DEFAULT_UPCOMING_DAYS};

/// Query params for recurring payments
#[derive(Debug, Deserialize)]
pub struct RecurringQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// GET /api/recurring - Recurring payments with monthly and yearly totals
pub async fn get_recurring_payments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecurringQuery>,
    headers: HeaderMap,
) -> Result<Json<RecurringSummary>, AppError> {
    let user_id = request_user(&headers, &state.config)?;

    let summary = RecurringDetector::new(&state.db)
        .with_config(state.config.detection.clone())
        .recurring_payments(user_id, query.force_refresh)?;

    Ok(Json(summary))
}

/// Query params for raw detection
#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    pub min_occurrences: Option<usize>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Response for raw detection
#[derive(Serialize)]
pub struct DetectResponse {
    pub recurring: Vec<RecurringGroup>,
    pub total_count: usize,
    pub computed_at: DateTime<Utc>,
    pub from_snapshot: bool,
}

/// GET /api/recurring/detect - Every group meeting `min_occurrences`
pub async fn detect_recurring(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DetectQuery>,
    headers: HeaderMap,
) -> Result<Json<DetectResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;

    let mut config = state.config.detection.clone();
    if let Some(min) = query.min_occurrences {
        config = config.with_min_occurrences(min);
    }

    let detection = RecurringDetector::new(&state.db)
        .with_config(config)
        .detect(user_id, query.force_refresh)?;

    Ok(Json(DetectResponse {
        recurring: detection.recurring,
        total_count: detection.total_count,
        computed_at: detection.computed_at,
        from_snapshot: detection.from_snapshot,
    }))
}

/// Query params for upcoming payments
#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    DEFAULT_UPCOMING_DAYS
}

/// GET /api/recurring/upcoming - Charges expected in the next `days` (1-30)
pub async fn get_upcoming_payments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpcomingQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<UpcomingPayment>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let today = Local::now().date_naive();

    let upcoming = RecurringDetector::new(&state.db)
        .with_config(state.config.detection.clone())
        .upcoming(user_id, query.days, today)?;

    Ok(Json(upcoming))
}
