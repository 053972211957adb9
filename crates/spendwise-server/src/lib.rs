//! Spendwise Web Server
//!
//! Axum-based REST API for the Spendwise spending tracker.
//!
//! - Restrictive CORS policy (same-origin unless origins are configured)
//! - Input validation (pagination limits, file size limits)
//! - Sanitized error responses
//!
//! The `x-user-id` header selects which user's data a request operates on.
//! Authentication is expected to happen in front of this server.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use spendwise_core::ai::{AIBackend, AIClient};
use spendwise_core::categorize::CategorizationConfig;
use spendwise_core::db::Database;
use spendwise_core::recurring::DetectionConfig;

mod handlers;

/// Maximum file upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum page size for the filtered transaction view
pub const MAX_PAGE_SIZE: i64 = 500;

/// Header selecting the user a request acts for
pub const USER_ID_HEADER: &str = "x-user-id";

/// Environment variable with comma-separated allowed CORS origins
pub const CORS_ORIGINS_ENV: &str = "SPENDWISE_CORS_ORIGINS";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// User for requests without an `x-user-id` header
    pub default_user_id: i64,
    pub categorization: CategorizationConfig,
    pub detection: DetectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            default_user_id: 1,
            categorization: CategorizationConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Default configuration with origins from `SPENDWISE_CORS_ORIGINS`
    pub fn from_env() -> Self {
        Self {
            allowed_origins: std::env::var(CORS_ORIGINS_ENV)
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Split a comma-separated origin list, dropping blanks
pub fn parse_origins(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
}

/// Resolve the user a request acts for
///
/// A present but malformed `x-user-id` is rejected rather than silently
/// falling back to the default user.
pub fn request_user(headers: &HeaderMap, config: &ServerConfig) -> Result<i64, AppError> {
    match headers.get(USER_ID_HEADER) {
        None => Ok(config.default_user_id),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::bad_request("Invalid x-user-id header")),
    }
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router, with the AI provider taken from the environment
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    let ai = AIClient::from_env();
    match ai {
        Some(ref client) => info!(
            host = client.host(),
            model = client.model(),
            "AI provider configured"
        ),
        None => info!("AI provider not configured (set OPENAI_COMPATIBLE_API_KEY to enable categorization)"),
    }
    create_router_with_ai(db, static_dir, config, ai)
}

/// Create the application router with an explicit AI provider (for testing)
pub fn create_router_with_ai(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    ai: Option<AIClient>,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        ai,
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Categorization
        .route("/categorize_batch", post(handlers::categorize_batch))
        .route("/categorize_merchant", post(handlers::categorize_merchant))
        // Insights
        .route("/insights", post(handlers::spending_insights))
        // Accounts
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route("/accounts/:id", get(handlers::get_account))
        // Categories
        .route("/categories", get(handlers::list_category_names))
        .route(
            "/categories/manage",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/categories/manage/:id",
            put(handlers::rename_category).delete(handlers::delete_category),
        )
        .route("/categories/reset", post(handlers::reset_categories))
        .route("/categories/reorder", post(handlers::reorder_categories))
        // Recurring
        .route("/recurring", get(handlers::get_recurring_payments))
        .route("/recurring/detect", get(handlers::detect_recurring))
        .route("/recurring/upcoming", get(handlers::get_upcoming_payments))
        .route("/recurring/insights", get(handlers::recurring_insights))
        // Transactions
        .route("/transactions", post(handlers::create_transaction))
        .route("/transactions/upload", post(handlers::upload_transactions))
        .route("/transactions/view", get(handlers::view_transactions))
        .route(
            "/transactions/:id",
            get(handlers::get_transaction).patch(handlers::update_transaction),
        )
        .route(
            "/transactions/:id/category",
            patch(handlers::update_transaction_category),
        )
        .route("/transactions/:id/note", patch(handlers::update_transaction_note))
        // Dashboard
        .route("/dashboard/stats", get(handlers::get_dashboard_stats))
        .route(
            "/dashboard/stats/period",
            get(handlers::get_dashboard_period_stats),
        );

    let cors_methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors_headers = [header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(cors_methods)
            .allow_headers(cors_headers)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(cors_methods)
            .allow_headers(cors_headers)
    };

    let mut app = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    // Serve the dashboard build if a directory is provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    check_ai_connection().await;

    let app = create_router(db, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI provider connection status
async fn check_ai_connection() {
    match AIClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(host = client.host(), model = client.model(), "AI provider connected");
            } else {
                warn!(
                    host = client.host(),
                    "AI provider configured but not responding; categorization will degrade to Uncategorized"
                );
            }
        }
        None => {
            info!("AI provider not configured; only cached merchants will be categorized");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn service_unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Caller mistakes carry their own message; everything else is opaque
        if let Some(core) = err.downcast_ref::<spendwise_core::Error>() {
            match core {
                spendwise_core::Error::Validation(msg) | spendwise_core::Error::Import(msg) => {
                    return Self::bad_request(msg)
                }
                spendwise_core::Error::Csv(e) => {
                    return Self::bad_request(&format!("Invalid CSV: {}", e))
                }
                spendwise_core::Error::NotFound(msg) => return Self::not_found(msg),
                spendwise_core::Error::ProviderUnavailable(_) => {
                    warn!(error = %err, "AI provider unavailable");
                    return Self::service_unavailable("AI provider unavailable");
                }
                _ => {}
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
