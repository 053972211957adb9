//! Transaction handlers

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{json_body, parse_date_param};
use crate::{request_user, AppError, AppState, MAX_PAGE_SIZE, MAX_UPLOAD_SIZE};
use spendwise_core::aggregate::aggregate;
use spendwise_core::categorize::{BatchCategorizationResult, BatchCategorizer};
use spendwise_core::db::{DateRange, TransactionFilter, TransactionInsertResult, TransactionUpdate};
use spendwise_core::import::{import_csv, ImportSummary};
use spendwise_core::models::{AggregateResult, NewTransaction, Transaction, UNCATEGORIZED};

/// Response for a CSV upload
#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub summary: ImportSummary,
    /// Present when `auto_categorize` was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorization: Option<BatchCategorizationResult>,
}

/// POST /api/transactions/upload - Import a bank CSV export
///
/// Expects multipart form with:
/// - `file`: the CSV export
/// - `account_id` (optional): account to import into
/// - `auto_categorize` (optional): categorize the new rows before returning
pub async fn upload_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;

    let mut file_data: Option<Vec<u8>> = None;
    let mut account_id: Option<i64> = None;
    let mut auto_categorize = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        MAX_UPLOAD_SIZE / 1024 / 1024
                    )));
                }

                file_data = Some(bytes.to_vec());
            }
            "account_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read account_id"))?;
                if !value.trim().is_empty() {
                    account_id = Some(value.trim().parse().map_err(|_| {
                        AppError::bad_request(&format!("Invalid account_id: {}", value))
                    })?);
                }
            }
            "auto_categorize" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read auto_categorize"))?;
                auto_categorize = matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "on");
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| AppError::bad_request("Missing file field"))?;
    let summary = import_csv(&state.db, user_id, Cursor::new(file_data), account_id)?;

    let categorization = if auto_categorize && !summary.inserted_ids.is_empty() {
        let result = BatchCategorizer::new(&state.db, state.ai.as_ref())
            .with_config(state.config.categorization)
            .categorize_batch(user_id, &summary.inserted_ids, true)
            .await?;
        Some(result)
    } else {
        None
    };

    info!(
        user_id,
        inserted = summary.inserted_count,
        skipped = summary.skipped_count,
        auto_categorize,
        "CSV upload complete"
    );

    Ok(Json(UploadResponse {
        summary,
        categorization,
    }))
}

/// Request body for creating a transaction by hand
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(flatten)]
    pub transaction: NewTransaction,
    pub account_id: Option<i64>,
}

/// POST /api/transactions - Create a transaction by hand
///
/// A category given here counts as the user's choice.
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;
    let mut tx = req.transaction;

    if tx.description_raw.trim().is_empty() {
        return Err(AppError::bad_request("description_raw must not be empty"));
    }
    if !tx.amount.is_finite() {
        return Err(AppError::bad_request("amount must be a number"));
    }
    if let Some(account_id) = req.account_id {
        state
            .db
            .get_account(user_id, account_id)?
            .ok_or_else(|| AppError::not_found("Account not found"))?;
    }

    tx.category = match tx.category.as_deref() {
        None => None,
        Some(name) => match state.db.resolve_category_name(user_id, name)? {
            Some(c) if c == UNCATEGORIZED => None,
            Some(c) => Some(c),
            None => return Err(AppError::bad_request(&format!("Invalid category: {}", name))),
        },
    };

    let id = match state.db.insert_transaction(user_id, req.account_id, &tx, None)? {
        TransactionInsertResult::Inserted(id) | TransactionInsertResult::Duplicate(id) => id,
    };
    let created = state
        .db
        .get_transaction(user_id, id)?
        .ok_or_else(|| AppError::internal("Created transaction not found"))?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/transactions/:id - Get one transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Transaction>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let tx = state
        .db
        .get_transaction(user_id, id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}

/// Request body for editing date and/or amount
#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
}

/// PATCH /api/transactions/:id - Edit date and/or amount
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<UpdateTransactionRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    if req.amount.is_some_and(|a| !a.is_finite()) {
        return Err(AppError::bad_request("amount must be a number"));
    }

    let update = TransactionUpdate {
        date: req.date,
        amount: req.amount,
    };
    let tx = state
        .db
        .update_transaction(user_id, id, &update)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}

/// Request body for editing the category
#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub category: String,
}

/// PATCH /api/transactions/:id/category - Set the category by hand
///
/// The transaction's category source becomes `user`, so batch
/// categorization will never change it again.
pub async fn update_transaction_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let category = state
        .db
        .resolve_category_name(user_id, &req.category)?
        .ok_or_else(|| AppError::bad_request(&format!("Invalid category: {}", req.category)))?;

    let tx = state
        .db
        .set_transaction_category(user_id, id, &category)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    state.db.invalidate_recurring_snapshot(user_id)?;

    Ok(Json(tx))
}

/// Request body for editing the note
#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub note: Option<String>,
}

/// PATCH /api/transactions/:id/note - Set or clear the note
pub async fn update_transaction_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = request_user(&headers, &state.config)?;
    let req = json_body(payload)?;

    let note = req
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let tx = state
        .db
        .set_transaction_note(user_id, id, note)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}

/// Query parameters for the filtered transaction view
#[derive(Debug, Deserialize)]
pub struct TransactionViewQuery {
    pub account_id: Option<i64>,
    /// Preset window (last_7_days, this_month, ...); ignored when explicit dates are given
    pub date_range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma-separated category names
    pub categories: Option<String>,
    /// Merchant search over description, note and merchant key
    pub search: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

#[derive(Serialize)]
pub struct TransactionViewResponse {
    pub transactions: Vec<Transaction>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    /// Totals over the whole filtered set, not just this page
    pub aggregates: AggregateResult,
}

/// Resolve explicit dates or a preset into an inclusive range
pub(crate) fn resolve_date_range(
    preset: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<Option<(NaiveDate, NaiveDate)>, AppError> {
    let start = parse_date_param(start, "start_date")?;
    let end = parse_date_param(end, "end_date")?;

    let range = match (start, end, preset) {
        (Some(s), Some(e), _) => Some((s, e)),
        (Some(s), None, _) => Some((s, today.max(s))),
        (None, Some(e), _) => Some((DateRange::AllTime.resolve(e).0, e)),
        (None, None, Some(preset)) => {
            let range: DateRange = preset
                .parse()
                .map_err(|e: String| AppError::bad_request(&e))?;
            Some(range.resolve(today))
        }
        (None, None, None) => None,
    };

    if let Some((s, e)) = range {
        if s > e {
            return Err(AppError::bad_request("start_date must not be after end_date"));
        }
    }
    Ok(range)
}

/// GET /api/transactions/view - Filtered page of transactions plus aggregates
pub async fn view_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionViewQuery>,
    headers: HeaderMap,
) -> Result<Json<TransactionViewResponse>, AppError> {
    let user_id = request_user(&headers, &state.config)?;

    if params.page < 1 {
        return Err(AppError::bad_request("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&params.page_size) {
        return Err(AppError::bad_request(&format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if let (Some(min), Some(max)) = (params.min_amount, params.max_amount) {
        if min > max {
            return Err(AppError::bad_request("min_amount must not exceed max_amount"));
        }
    }

    let date_range = resolve_date_range(
        params.date_range.as_deref(),
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        Local::now().date_naive(),
    )?;

    let categories: Option<Vec<String>> = params.categories.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    });

    let filter = TransactionFilter::new()
        .account_id(params.account_id)
        .date_range(date_range)
        .categories(categories.as_deref())
        .search(params.search.as_deref())
        .amount_range(params.min_amount, params.max_amount);

    let offset = (params.page - 1) * params.page_size;
    let transactions = state
        .db
        .search_transactions(user_id, &filter, params.page_size, offset)?;
    let total = state.db.count_transactions(user_id, &filter)?;
    let aggregates = aggregate(&state.db.filtered_transactions(user_id, &filter)?);

    Ok(Json(TransactionViewResponse {
        transactions,
        total,
        page: params.page,
        page_size: params.page_size,
        total_pages: (total + params.page_size - 1) / params.page_size,
        aggregates,
    }))
}
