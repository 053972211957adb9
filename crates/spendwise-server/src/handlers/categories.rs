//! Category management handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use super::json_body;
use crate::{request_user, AppError, AppState};
use spendwise_core::models::Category;

/// GET /api/categories - Category names valid for assignment
pub async fn list_category_names(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    Ok(Json(state.db.category_names(user_id)?))
}

/// GET /api/categories/manage - Full category records in display order
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Category>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    Ok(Json(state.db.list_categories(user_id)?))
}

/// Request body for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub color: Option<String>,
}

/// POST /api/categories/manage - Create a category
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let category = state
        .db
        .create_category(user_id, &req.name, req.color.as_deref())?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Request body for renaming a category
#[derive(Debug, Deserialize)]
pub struct RenameCategoryRequest {
    pub name: String,
}

/// PUT /api/categories/manage/:id - Rename a category
pub async fn rename_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<RenameCategoryRequest>, JsonRejection>,
) -> Result<Json<Category>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    Ok(Json(state.db.rename_category(user_id, id, &req.name)?))
}

/// Response for deleting a category
#[derive(Serialize)]
pub struct DeleteCategoryResponse {
    pub success: bool,
    /// Transactions moved back to "Uncategorized"
    pub transactions_reset: usize,
}

/// DELETE /api/categories/manage/:id - Delete a category
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<DeleteCategoryResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let transactions_reset = state.db.delete_category(user_id, id)?;

    Ok(Json(DeleteCategoryResponse {
        success: true,
        transactions_reset,
    }))
}

/// POST /api/categories/reset - Restore the default categories
pub async fn reset_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Category>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    Ok(Json(state.db.reset_categories(user_id)?))
}

/// Request body for reordering categories
#[derive(Debug, Deserialize)]
pub struct ReorderCategoriesRequest {
    pub category_ids: Vec<i64>,
}

/// POST /api/categories/reorder - Set the display order of categories
///
/// "Other" always stays last.
pub async fn reorder_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ReorderCategoriesRequest>, JsonRejection>,
) -> Result<Json<Vec<Category>>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    Ok(Json(state.db.reorder_categories(user_id, &req.category_ids)?))
}
