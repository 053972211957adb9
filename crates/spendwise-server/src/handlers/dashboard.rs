//! Dashboard handler

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::transactions::resolve_date_range;
use crate::{request_user, AppError, AppState};
use spendwise_core::aggregate::DashboardSummary;
use spendwise_core::db::{DateRange, TransactionFilter};

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    /// Preset window; defaults to the last 30 days
    pub range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub account_id: Option<i64>,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub account_count: usize,
    #[serde(flatten)]
    pub summary: DashboardSummary,
}

/// GET /api/dashboard/stats - Spending overview for a date window
pub async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let today = Local::now().date_naive();

    let preset = query
        .range
        .as_deref()
        .unwrap_or(DateRange::Last30Days.as_str());
    let (start_date, end_date) = resolve_date_range(
        Some(preset),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        today,
    )?
    .unwrap_or_else(|| DateRange::Last30Days.resolve(today));

    Ok(Json(dashboard_for(
        &state,
        user_id,
        query.account_id,
        start_date,
        end_date,
    )?))
}

/// Longest look-back accepted by the period endpoint
const MAX_PERIOD_MONTHS: u32 = 120;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// Calendar months to look back from today; defaults to 1
    pub months: Option<u32>,
    pub account_id: Option<i64>,
}

/// GET /api/dashboard/stats/period - Spending overview for the last N months
pub async fn get_dashboard_period_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodQuery>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let months = query.months.unwrap_or(1);
    if !(1..=MAX_PERIOD_MONTHS).contains(&months) {
        return Err(AppError::bad_request(&format!(
            "months must be between 1 and {}",
            MAX_PERIOD_MONTHS
        )));
    }

    let today = Local::now().date_naive();
    let start_date = today
        .checked_sub_months(Months::new(months))
        .unwrap_or(today);

    Ok(Json(dashboard_for(
        &state,
        user_id,
        query.account_id,
        start_date,
        today,
    )?))
}

fn dashboard_for(
    state: &AppState,
    user_id: i64,
    account_id: Option<i64>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<DashboardResponse, AppError> {
    let filter = TransactionFilter::new()
        .account_id(account_id)
        .date_range(Some((start_date, end_date)));
    let transactions = state.db.filtered_transactions(user_id, &filter)?;

    Ok(DashboardResponse {
        start_date,
        end_date,
        account_count: state.db.list_accounts(user_id)?.len(),
        summary: DashboardSummary::from_transactions(&transactions),
    })
}
