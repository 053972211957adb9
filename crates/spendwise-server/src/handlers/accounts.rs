//! Account handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::json_body;
use crate::{request_user, AppError, AppState};
use spendwise_core::models::{Account, NewAccount};

/// GET /api/accounts - List the user's accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Account>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    Ok(Json(state.db.list_accounts(user_id)?))
}

/// GET /api/accounts/:id - Get a single account
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Account>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let account = state
        .db
        .get_account(user_id, id)?
        .ok_or_else(|| AppError::not_found("Account not found"))?;
    Ok(Json(account))
}

/// POST /api/accounts - Create an account
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let account = state.db.create_account(user_id, &req)?;
    Ok((StatusCode::CREATED, Json(account)))
}
