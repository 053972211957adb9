//! Categorization handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use super::json_body;
use crate::{request_user, AppError, AppState};
use spendwise_core::categorize::{
    BatchCategorizationResult, BatchCategorizer, MerchantCategorization,
};

/// Request body for batch categorization
#[derive(Debug, Deserialize)]
pub struct CategorizeBatchRequest {
    pub transaction_ids: Vec<i64>,
    #[serde(default)]
    pub auto_apply: bool,
}

/// POST /api/categorize_batch - Categorize transactions by merchant
///
/// Provider failures never fail the request; they show up per transaction
/// in the `error` field.
pub async fn categorize_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CategorizeBatchRequest>, JsonRejection>,
) -> Result<Json<BatchCategorizationResult>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let result = BatchCategorizer::new(&state.db, state.ai.as_ref())
        .with_config(state.config.categorization)
        .categorize_batch(user_id, &req.transaction_ids, req.auto_apply)
        .await?;

    Ok(Json(result))
}

/// Request body for single-merchant categorization
#[derive(Debug, Deserialize)]
pub struct CategorizeMerchantRequest {
    pub merchant_key: String,
    #[serde(default)]
    pub sample_descriptions: Vec<String>,
}

/// POST /api/categorize_merchant - Categorize one merchant
///
/// Answers from the cache when possible and applies the category to the
/// merchant's uncategorized transactions. Responds 503 when the merchant is
/// not cached and the provider cannot answer.
pub async fn categorize_merchant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CategorizeMerchantRequest>, JsonRejection>,
) -> Result<Json<MerchantCategorization>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let result = BatchCategorizer::new(&state.db, state.ai.as_ref())
        .with_config(state.config.categorization)
        .categorize_merchant(user_id, &req.merchant_key, &req.sample_descriptions)
        .await?;

    Ok(Json(result))
}
