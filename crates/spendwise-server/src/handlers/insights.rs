//! Insight handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Local;
use serde::Deserialize;

use super::json_body;
use super::transactions::resolve_date_range;
use crate::{request_user, AppError, AppState};
use spendwise_core::db::TransactionFilter;
use spendwise_core::insights::{InsightsService, RecurringInsights, SpendingInsights};

/// Request body for spending insights; the same filters as the transaction view
#[derive(Debug, Default, Deserialize)]
pub struct SpendingInsightsRequest {
    pub account_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub category: Vec<String>,
    pub merchant_query: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

/// POST /api/insights - Narrative insights for a filtered period
///
/// Falls back to rule-based insights (`source: "rules"`) when the provider
/// is missing or fails.
pub async fn spending_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SpendingInsightsRequest>, JsonRejection>,
) -> Result<Json<SpendingInsights>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let today = Local::now().date_naive();
    let date_range = resolve_date_range(
        None,
        req.start_date.as_deref(),
        req.end_date.as_deref(),
        today,
    )?;

    let filter = TransactionFilter::new()
        .account_id(req.account_id)
        .date_range(date_range)
        .categories(Some(&req.category))
        .search(req.merchant_query.as_deref())
        .amount_range(req.min_amount, req.max_amount);

    let insights = InsightsService::new(&state.db, state.ai.as_ref())
        .spending_insights(user_id, &filter)
        .await?;
    Ok(Json(insights))
}

/// Query params for recurring insights
#[derive(Debug, Deserialize)]
pub struct RecurringInsightsQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// GET /api/recurring/insights - Cached analysis of recurring payments
pub async fn recurring_insights(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecurringInsightsQuery>,
    headers: HeaderMap,
) -> Result<Json<RecurringInsights>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let today = Local::now().date_naive();

    let insights = InsightsService::new(&state.db, state.ai.as_ref())
        .with_detection(state.config.detection.clone())
        .recurring_insights(user_id, query.force_refresh, today)
        .await?;
    Ok(Json(insights))
}
