//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod accounts;
pub mod categories;
pub mod categorize;
pub mod dashboard;
pub mod health;
pub mod insights;
pub mod recurring;
pub mod transactions;

// Re-export all handlers for use in router
pub use accounts::*;
pub use categories::*;
pub use categorize::*;
pub use dashboard::*;
pub use health::*;
pub use insights::*;
pub use recurring::*;
pub use transactions::*;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use chrono::NaiveDate;

use crate::AppError;

/// Unwrap a JSON body, reporting malformed input as a 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::bad_request(&format!("Invalid request body: {}", e.body_text())))
}

/// Parse an optional `YYYY-MM-DD` parameter
pub(crate) fn parse_date_param(value: Option<&str>, name: &str) -> Result<Option<NaiveDate>, AppError> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::bad_request(&format!("Invalid {} (use YYYY-MM-DD)", name)))
}
