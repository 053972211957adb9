//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Days, Local, NaiveDate};
use http_body_util::BodyExt;
use spendwise_core::ai::MockBackend;
use spendwise_core::db::CacheSuggestion;
use spendwise_core::models::{Confidence, NewAccount, NewTransaction};
use spendwise_core::test_utils::MockProviderServer;
use tower::ServiceExt;

const BOUNDARY: &str = "spendwise-test-boundary";

/// RBC export: a monthly Netflix charge plus a few one-offs
const RBC_EXPORT: &str = "Account Type,Account Number,Transaction Date,Cheque Number,Description 1,Description 2,CAD$,USD$
Chequing,06702-5012345,09/26/2025,,NETFLIX.COM,,-15.99,
Chequing,06702-5012345,10/26/2025,,NETFLIX.COM,,-15.99,
Chequing,06702-5012345,11/26/2025,,NETFLIX.COM,,-15.99,
Chequing,06702-5012345,11/01/2025,,LOBLAWS,,-10.00,
Chequing,06702-5012345,11/01/2025,,MCDONALD'S #41147,,-5.00,
Chequing,06702-5012345,11/03/2025,,PAYROLL DEPOSIT,,100.00,
";

fn setup_test_app() -> Router {
    let db = Database::in_memory().unwrap();
    setup_app_with(db, Some(AIClient::mock()))
}

fn setup_app_with(db: Database, ai: Option<AIClient>) -> Router {
    let config = ServerConfig {
        allowed_origins: vec![],
        ..Default::default()
    };
    create_router_with_ai(db, None, config, ai)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Multipart upload with an optional CSV file and extra text fields
fn upload_request(csv: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    if let Some(csv) = csv {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"export.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n"
        ));
    }
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/api/transactions/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn insert(db: &Database, user_id: i64, on: NaiveDate, description: &str, amount: f64) -> i64 {
    match db
        .insert_transaction(user_id, None, &NewTransaction::new(on, description, amount), None)
        .unwrap()
    {
        spendwise_core::TransactionInsertResult::Inserted(id) => id,
        other => panic!("unexpected insert result: {:?}", other),
    }
}

fn approx(value: &serde_json::Value, expected: f64) -> bool {
    (value.as_f64().unwrap() - expected).abs() < 1e-9
}

// ========== Health & Middleware ==========

#[tokio::test]
async fn test_health_with_ai() {
    let app = setup_test_app();

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["ai_configured"], true);
    assert_eq!(json["ai_available"], true);
    assert_eq!(json["ai_model"], "mock");
}

#[tokio::test]
async fn test_health_without_ai() {
    let app = setup_app_with(Database::in_memory().unwrap(), None);

    let response = app.oneshot(get("/api/health")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["ai_configured"], false);
    assert_eq!(json["ai_available"], false);
    assert!(json.get("ai_host").is_none());
}

#[tokio::test]
async fn test_security_headers() {
    let app = setup_test_app();

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn test_invalid_user_header_rejected() {
    let app = setup_test_app();

    for value in ["abc", "0", "-3"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/categories")
                    .header("x-user-id", value)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "x-user-id {}", value);
    }
}

#[test]
fn test_parse_origins() {
    assert_eq!(
        parse_origins(" https://a.example , ,https://b.example"),
        vec!["https://a.example", "https://b.example"]
    );
    assert!(parse_origins("").is_empty());
}

// ========== Category API Tests ==========

#[tokio::test]
async fn test_list_category_names() {
    let app = setup_test_app();

    let response = app.oneshot(get("/api/categories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(names.contains(&"Groceries"));
    assert!(names.contains(&"Eating Out"));
    assert_eq!(names.last(), Some(&"Other"));
}

#[tokio::test]
async fn test_create_category() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categories/manage",
            serde_json::json!({ "name": "Pets", "color": "#ff0000" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = get_body_json(response).await;
    assert_eq!(json["name"], "Pets");
    assert_eq!(json["color"], "#ff0000");
    assert_eq!(json["is_system"], false);

    // Names are unique case-insensitively
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categories/manage",
            serde_json::json!({ "name": "pets" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing name is a malformed body
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categories/manage",
            serde_json::json!({ "color": "#000000" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn category_id(app: &Router, name: &str) -> i64 {
    let response = app.clone().oneshot(get("/api/categories/manage")).await.unwrap();
    let json = get_body_json(response).await;
    json.as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == name)
        .and_then(|c| c["id"].as_i64())
        .unwrap()
}

#[tokio::test]
async fn test_rename_category_updates_transactions() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-11-05",
                "description_raw": "LOBLAWS #1",
                "amount": -42.5,
                "category": "Groceries"
            }),
        ))
        .await
        .unwrap();
    let tx_id = get_body_json(response).await["id"].as_i64().unwrap();

    let id = category_id(&app, "Groceries").await;
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/categories/manage/{}", id),
            serde_json::json!({ "name": "Food" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["name"], "Food");

    let response = app
        .oneshot(get(&format!("/api/transactions/{}", tx_id)))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["category"], "Food");
}

#[tokio::test]
async fn test_delete_category() {
    let app = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-11-05",
                "description_raw": "UBER TRIP",
                "amount": -12.0,
                "category": "Transport"
            }),
        ))
        .await
        .unwrap();

    let id = category_id(&app, "Transport").await;
    let uri = format!("/api/categories/manage/{}", id);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["transactions_reset"], 1);

    // Already gone
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_category_is_protected() {
    let app = setup_test_app();
    let id = category_id(&app, "Other").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/categories/manage/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_categories() {
    let app = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/categories/manage",
            serde_json::json!({ "name": "Pets" }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/categories/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(!json
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["name"] == "Pets"));
}

#[tokio::test]
async fn test_categories_are_per_user() {
    let app = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/categories/manage",
            serde_json::json!({ "name": "Pets" }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/categories")
                .header("x-user-id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert!(!json.as_array().unwrap().iter().any(|c| c == "Pets"));
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_create_transaction() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-11-05",
                "description_raw": "LOBLAWS #1",
                "amount": -42.5,
                "category": "groceries"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = get_body_json(response).await;
    assert_eq!(json["category"], "Groceries");
    assert_eq!(json["category_source"], "user");
    assert_eq!(json["merchant_key"], "LOBLAWS");
    assert_eq!(json["currency"], "CAD");
    assert_eq!(json["is_expense"], true);

    // "Uncategorized" leaves the transaction open for categorization
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-11-06",
                "description_raw": "CORNER STORE",
                "amount": -3.0,
                "category": "Uncategorized"
            }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["category"], "Uncategorized");
    assert_eq!(json["category_source"], "uncategorized");
}

#[tokio::test]
async fn test_create_transaction_validation() {
    let app = setup_test_app();

    let bad_bodies = [
        serde_json::json!({
            "date": "2025-11-05", "description_raw": "SHOP", "amount": -1.0, "category": "Nope"
        }),
        serde_json::json!({ "date": "2025-11-05", "description_raw": "   ", "amount": -1.0 }),
        serde_json::json!({ "date": "11/05/2025", "description_raw": "SHOP", "amount": -1.0 }),
        serde_json::json!({ "description_raw": "SHOP", "amount": -1.0 }),
    ];

    for body in bad_bodies {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/transactions", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-11-05", "description_raw": "SHOP", "amount": -1.0, "account_id": 999
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transactions_are_scoped_to_user() {
    let db = Database::in_memory().unwrap();
    let id = insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -10.0);
    let app = setup_app_with(db, Some(AIClient::mock()));

    let response = app
        .clone()
        .oneshot(get(&format!("/api/transactions/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/transactions/{}", id))
                .header("x-user-id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/transactions/view")
                .header("x-user-id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["total"], 0);
}

#[tokio::test]
async fn test_update_transaction() {
    let db = Database::in_memory().unwrap();
    let id = insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -10.0);
    let app = setup_app_with(db, Some(AIClient::mock()));
    let uri = format!("/api/transactions/{}", id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            serde_json::json!({ "date": "2025-11-02", "amount": -12.25 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["date"], "2025-11-02");
    assert!(approx(&json["amount"], -12.25));

    // Only the amount
    let response = app
        .clone()
        .oneshot(json_request("PATCH", &uri, serde_json::json!({ "amount": 5.0 })))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["date"], "2025-11-02");
    assert_eq!(json["is_expense"], false);

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/transactions/9999",
            serde_json::json!({ "amount": 1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_transaction_category() {
    let db = Database::in_memory().unwrap();
    let id = insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -10.0);
    let app = setup_app_with(db, Some(AIClient::mock()));
    let uri = format!("/api/transactions/{}/category", id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            serde_json::json!({ "category": "eating out" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["category"], "Eating Out");
    assert_eq!(json["category_source"], "user");

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            serde_json::json!({ "category": "Made Up" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A human choice is never overwritten by batch categorization
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "transaction_ids": [id], "auto_apply": true }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["results"][0]["category"], "Eating Out");
    assert_eq!(json["results"][0]["applied"], false);
}

#[tokio::test]
async fn test_update_transaction_note() {
    let db = Database::in_memory().unwrap();
    let id = insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -10.0);
    let app = setup_app_with(db, Some(AIClient::mock()));
    let uri = format!("/api/transactions/{}/note", id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            serde_json::json!({ "note": " weekly shop " }),
        ))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["note_user"], "weekly shop");

    let response = app
        .oneshot(json_request("PATCH", &uri, serde_json::json!({ "note": "" })))
        .await
        .unwrap();
    assert!(get_body_json(response).await["note_user"].is_null());
}

// ========== Upload Tests ==========

#[tokio::test]
async fn test_upload_rbc_csv() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(upload_request(Some(RBC_EXPORT), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["inserted_count"], 6);
    assert_eq!(json["skipped_count"], 0);
    assert_eq!(json["failed_rows"], 0);
    assert!(json["account_id"].as_i64().is_some());
    assert_eq!(json["inserted_ids"].as_array().unwrap().len(), 6);
    assert!(json.get("categorization").is_none());

    // Same export again: everything is a duplicate
    let response = app
        .oneshot(upload_request(Some(RBC_EXPORT), &[]))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["inserted_count"], 0);
    assert_eq!(json["skipped_count"], 6);
}

#[tokio::test]
async fn test_upload_with_auto_categorize() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(upload_request(
            Some(RBC_EXPORT),
            &[("auto_categorize", "true")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["categorization"]["total_processed"], 6);
    assert_eq!(json["categorization"]["failed"], 0);

    let response = app
        .oneshot(get("/api/transactions/view?categories=Subscription"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["transactions"][0]["category_source"], "ai");
}

#[tokio::test]
async fn test_upload_generic_csv_into_account() {
    let db = Database::in_memory().unwrap();
    let account_id = db.create_account(1, &NewAccount::named("Visa")).unwrap().id;
    let app = setup_app_with(db, Some(AIClient::mock()));

    let csv = "Date,Description,Amount\n2025-11-01,COFFEE SHOP,-4.50\nnot a date,BROKEN,-1\n";
    let account = account_id.to_string();
    let response = app
        .oneshot(upload_request(Some(csv), &[("account_id", account.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["inserted_count"], 1);
    assert_eq!(json["failed_rows"], 1);
    assert_eq!(json["account_id"], account_id);
}

#[tokio::test]
async fn test_upload_errors() {
    let app = setup_test_app();

    let response = app.clone().oneshot(upload_request(None, &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(upload_request(Some("foo,bar\n1,2\n"), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(upload_request(Some(RBC_EXPORT), &[("account_id", "abc")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(upload_request(Some(RBC_EXPORT), &[("account_id", "999")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Transaction View Tests ==========

async fn app_with_export() -> Router {
    let app = setup_test_app();
    let response = app
        .clone()
        .oneshot(upload_request(Some(RBC_EXPORT), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    app
}

#[tokio::test]
async fn test_view_pagination() {
    let app = app_with_export().await;

    let response = app
        .oneshot(get("/api/transactions/view?page=2&page_size=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total"], 6);
    assert_eq!(json["page"], 2);
    assert_eq!(json["total_pages"], 3);

    // Newest first: 11/26, 11/03, then the two 11/01 rows
    let page = json["transactions"].as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert!(page.iter().all(|t| t["date"] == "2025-11-01"));

    // Aggregates cover the whole filtered set, not the page
    assert!(approx(&json["aggregates"]["total_income"], 100.0));
    assert!(approx(&json["aggregates"]["total_spent"], -15.99 * 3.0 - 15.0));
}

#[tokio::test]
async fn test_view_date_filter_and_aggregates() {
    let app = app_with_export().await;

    let response = app
        .oneshot(get(
            "/api/transactions/view?start_date=2025-11-01&end_date=2025-11-30",
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 4);

    let by_day = json["aggregates"]["by_day"].as_array().unwrap();
    assert_eq!(by_day.len(), 3);
    assert_eq!(by_day[0]["date"], "2025-11-01");
    assert!(approx(&by_day[0]["net"], -15.0));
    assert_eq!(by_day[1]["date"], "2025-11-03");
    assert!(approx(&by_day[1]["net"], 100.0));
}

#[tokio::test]
async fn test_view_search_and_amount_filters() {
    let app = app_with_export().await;

    let response = app
        .clone()
        .oneshot(get("/api/transactions/view?search=netflix"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["total"], 3);

    let response = app
        .clone()
        .oneshot(get("/api/transactions/view?min_amount=0"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["transactions"][0]["merchant_key"], "PAYROLLDEPOSIT");

    let response = app
        .oneshot(get("/api/transactions/view?categories=Uncategorized,Groceries"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["total"], 6);
}

#[tokio::test]
async fn test_view_validation() {
    let app = setup_test_app();

    for uri in [
        "/api/transactions/view?page_size=501",
        "/api/transactions/view?page_size=0",
        "/api/transactions/view?page=0",
        "/api/transactions/view?start_date=2025-13-01",
        "/api/transactions/view?start_date=2025-11-30&end_date=2025-11-01",
        "/api/transactions/view?date_range=last_decade",
        "/api/transactions/view?min_amount=10&max_amount=1",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    let response = app
        .oneshot(get("/api/transactions/view?page_size=500&date_range=this_year"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ========== Categorization Tests ==========

#[tokio::test]
async fn test_categorize_batch_mixes_cache_and_provider() {
    let db = Database::in_memory().unwrap();
    let cached = insert(&db, 1, date(2025, 11, 1), "LOBLAWS #123", -50.0);
    let eating_out = insert(&db, 1, date(2025, 11, 2), "TIM HORTONS #55", -3.0);
    let invalid = insert(&db, 1, date(2025, 11, 3), "MYSTERY SHOP", -9.0);
    db.put_cached_merchant(
        1,
        "LOBLAWS",
        &CacheSuggestion {
            category: "Groceries".to_string(),
            note: None,
            confidence: Confidence::High,
            explanation: None,
        },
    )
    .unwrap();

    let mock = MockBackend::new()
        .with_response("TIMHORTONS", "Eating Out")
        .with_response("MYSTERYSHOP", "INVALID_CATEGORY");
    let app = setup_app_with(db, Some(AIClient::Mock(mock.clone())));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({
                "transaction_ids": [cached, eating_out, invalid],
                "auto_apply": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total_processed"], 3);
    assert_eq!(json["successful"], 3);
    assert_eq!(json["failed"], 0);

    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["transaction_id"], cached);
    assert_eq!(results[0]["category"], "Groceries");
    assert_eq!(results[1]["category"], "Eating Out");
    assert_eq!(results[1]["applied"], true);
    assert_eq!(results[2]["category"], "Uncategorized");
    assert_eq!(results[2]["applied"], false);
    assert!(results[2].get("error").is_none());

    // The cached merchant never reached the provider
    assert_eq!(mock.calls(), 1);
    assert!(!mock.requests()[0].contains(&"LOBLAWS".to_string()));
}

#[tokio::test]
async fn test_categorize_batch_provider_down() {
    let db = Database::in_memory().unwrap();
    let ids: Vec<i64> = (1..=5)
        .map(|i| insert(&db, 1, date(2025, 11, i), &format!("SHOP {} STORE", i), -1.0))
        .collect();
    let app = setup_app_with(db, Some(AIClient::Mock(MockBackend::failing())));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "transaction_ids": ids }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total_processed"], 5);
    assert_eq!(json["successful"], 0);
    assert_eq!(json["failed"], 5);
    for result in json["results"].as_array().unwrap() {
        assert_eq!(result["category"], "Uncategorized");
        assert_eq!(result["applied"], false);
        assert!(result["error"].is_string());
    }
}

#[tokio::test]
async fn test_categorize_batch_over_http_provider() {
    let server = MockProviderServer::start().await;
    let db = Database::in_memory().unwrap();
    let id = insert(&db, 1, date(2025, 11, 1), "NETFLIX.COM", -15.99);
    let ai = AIClient::openai_compatible(&server.url(), "test-model");
    let app = setup_app_with(db, Some(ai));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "transaction_ids": [id], "auto_apply": true }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["results"][0]["category"], "Subscription");
    assert_eq!(json["results"][0]["applied"], true);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_categorize_batch_errors() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "transaction_ids": [12345] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "ids": [1] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_batch",
            serde_json::json!({ "transaction_ids": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["total_processed"], 0);
}

// ========== Recurring Tests ==========

fn netflix_db() -> Database {
    let db = Database::in_memory().unwrap();
    for (m, d) in [(9, 26), (10, 26), (11, 26)] {
        insert(&db, 1, date(2025, m, d), "NETFLIX", -15.99);
    }
    db
}

#[tokio::test]
async fn test_detect_monthly_subscription() {
    let app = setup_app_with(netflix_db(), Some(AIClient::mock()));

    let response = app.oneshot(get("/api/recurring/detect")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total_count"], 1);
    let group = &json["recurring"][0];
    assert_eq!(group["merchant_key"], "NETFLIX");
    assert_eq!(group["frequency"], "monthly");
    assert_eq!(group["next_expected_date"], "2025-12-26");
    assert!(approx(&group["typical_amount"], 15.99));
    assert_eq!(group["transaction_count"], 3);
}

#[tokio::test]
async fn test_detect_snapshot_and_invalidation() {
    let app = setup_app_with(netflix_db(), Some(AIClient::mock()));

    let first = get_body_json(app.clone().oneshot(get("/api/recurring/detect")).await.unwrap()).await;
    assert_eq!(first["from_snapshot"], false);

    let second = get_body_json(app.clone().oneshot(get("/api/recurring/detect")).await.unwrap()).await;
    assert_eq!(second["from_snapshot"], true);
    assert_eq!(second["recurring"], first["recurring"]);

    let forced = get_body_json(
        app.clone()
            .oneshot(get("/api/recurring/detect?force_refresh=true"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(forced["from_snapshot"], false);

    // A new transaction invalidates the snapshot
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/transactions",
            serde_json::json!({
                "date": "2025-12-26", "description_raw": "NETFLIX", "amount": -15.99
            }),
        ))
        .await
        .unwrap();

    let after = get_body_json(app.oneshot(get("/api/recurring/detect")).await.unwrap()).await;
    assert_eq!(after["from_snapshot"], false);
    assert_eq!(after["recurring"][0]["transaction_count"], 4);
    assert_eq!(after["recurring"][0]["next_expected_date"], "2026-01-26");
}

#[tokio::test]
async fn test_detect_min_occurrences() {
    let app = setup_app_with(netflix_db(), Some(AIClient::mock()));

    let response = app
        .clone()
        .oneshot(get("/api/recurring/detect?min_occurrences=4"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["total_count"], 0);

    let response = app
        .oneshot(get("/api/recurring/detect?min_occurrences=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recurring_summary_totals() {
    let app = setup_app_with(netflix_db(), Some(AIClient::mock()));

    let response = app.oneshot(get("/api/recurring")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total_count"], 1);
    assert!(approx(&json["total_monthly"], 15.99));
    assert!(approx(&json["total_yearly"], 191.88));
    assert_eq!(json["recurring_payments"][0]["merchant_key"], "NETFLIX");
}

#[tokio::test]
async fn test_upcoming_payments() {
    let db = Database::in_memory().unwrap();
    let today = Local::now().date_naive();
    for days_ago in [80, 50, 20] {
        insert(&db, 1, today - Days::new(days_ago), "SPOTIFY", -11.99);
    }
    let app = setup_app_with(db, Some(AIClient::mock()));

    // Next charge is a calendar month after the last one, 8 to 11 days out
    let response = app
        .clone()
        .oneshot(get("/api/recurring/upcoming?days=30"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let upcoming = json.as_array().unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0]["merchant_key"], "SPOTIFY");
    let days_until = upcoming[0]["days_until"].as_i64().unwrap();
    assert!((8..=11).contains(&days_until), "days_until {}", days_until);

    // Default window is a week
    let response = app
        .clone()
        .oneshot(get("/api/recurring/upcoming"))
        .await
        .unwrap();
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());

    for days in ["0", "31"] {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/recurring/upcoming?days={}", days)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "days {}", days);
    }
}

// ========== Dashboard Tests ==========

#[tokio::test]
async fn test_dashboard_stats() {
    let db = Database::in_memory().unwrap();
    let today = Local::now().date_naive();
    db.insert_transaction(
        1,
        None,
        &NewTransaction {
            category: Some("Groceries".to_string()),
            ..NewTransaction::new(today - Days::new(2), "LOBLAWS", -40.0)
        },
        None,
    )
    .unwrap();
    insert(&db, 1, today - Days::new(1), "PAYROLL DEPOSIT", 1000.0);
    insert(&db, 1, today - Days::new(60), "OLD PURCHASE", -500.0);
    db.create_account(1, &NewAccount::named("Chequing")).unwrap();
    let app = setup_app_with(db, Some(AIClient::mock()));

    let response = app.clone().oneshot(get("/api/dashboard/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["account_count"], 1);
    assert_eq!(json["end_date"], today.to_string());
    assert_eq!(json["transaction_count"], 2);
    assert!(approx(&json["total_spent"], -40.0));
    assert!(approx(&json["total_income"], 1000.0));
    assert!(approx(&json["net"], 960.0));
    assert!(approx(&json["savings_rate"], 96.0));
    assert_eq!(json["top_category"], "Groceries");
    assert!(approx(&json["top_category_amount"], 40.0));

    let response = app
        .clone()
        .oneshot(get("/api/dashboard/stats?range=all_time"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["transaction_count"], 3);

    let response = app
        .oneshot(get("/api/dashboard/stats?range=forever"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_period_stats() {
    let db = Database::in_memory().unwrap();
    let today = Local::now().date_naive();
    insert(&db, 1, today - Days::new(3), "LOBLAWS", -40.0);
    insert(&db, 1, today - Days::new(45), "SHELL 555", -60.0);
    insert(&db, 1, today - Days::new(200), "OLD PURCHASE", -500.0);
    let app = setup_app_with(db, Some(AIClient::mock()));

    let response = app
        .clone()
        .oneshot(get("/api/dashboard/stats/period"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["transaction_count"], 1);
    assert_eq!(json["end_date"], today.to_string());

    let response = app
        .clone()
        .oneshot(get("/api/dashboard/stats/period?months=3"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["transaction_count"], 2);
    assert!(approx(&json["total_spent"], -100.0));

    for months in ["0", "abc"] {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/dashboard/stats/period?months={}", months)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "months {}", months);
    }
}

// ========== Account Tests ==========

#[tokio::test]
async fn test_create_and_list_accounts() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts",
            serde_json::json!({
                "name": " Visa Infinite ",
                "institution": "RBC",
                "account_type": "credit",
                "number_last4": "4111222233334444",
                "currency": "cad"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = get_body_json(response).await;
    assert_eq!(created["name"], "Visa Infinite");
    assert_eq!(created["institution"], "RBC");
    assert_eq!(created["number_last4"], "4444");
    assert_eq!(created["currency"], "CAD");
    let id = created["id"].as_i64().unwrap();

    let response = app.clone().oneshot(get("/api/accounts")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/accounts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Another user cannot see it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/accounts/{}", id))
                .header("x-user-id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_account_validation() {
    let app = setup_test_app();

    for body in [
        serde_json::json!({ "name": "   " }),
        serde_json::json!({ "name": "Visa", "currency": "DOLLARS" }),
        serde_json::json!({ "institution": "RBC" }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/accounts", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
    }
}

#[tokio::test]
async fn test_reorder_categories() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(get("/api/categories/manage"))
        .await
        .unwrap();
    let categories = get_body_json(response).await;
    let id_of = |name: &str| {
        categories
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["name"] == name)
            .unwrap()["id"]
            .as_i64()
            .unwrap()
    };
    let (income, rent) = (id_of("Income"), id_of("Rent"));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categories/reorder",
            serde_json::json!({ "category_ids": [income, rent] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names[0], "Income");
    assert_eq!(names[1], "Rent");
    assert_eq!(*names.last().unwrap(), "Other");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categories/reorder",
            serde_json::json!({ "category_ids": [income, 99999] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Single Merchant & Insights Tests ==========

#[tokio::test]
async fn test_categorize_merchant_applies_and_caches() {
    let db = Database::in_memory().unwrap();
    let first = insert(&db, 1, date(2025, 10, 1), "NETFLIX.COM 866-579-7172", -15.99);
    insert(&db, 1, date(2025, 11, 1), "NETFLIX.COM", -15.99);
    let mock = MockBackend::new();
    let app = setup_app_with(db, Some(AIClient::Mock(mock.clone())));

    let request = || {
        json_request(
            "POST",
            "/api/categorize_merchant",
            serde_json::json!({ "merchant_key": "NETFLIXCOM" }),
        )
    };

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["category"], "Subscription");
    assert_eq!(json["cached"], false);
    assert_eq!(json["applied_count"], 2);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/transactions/{}", first)))
        .await
        .unwrap();
    let tx = get_body_json(response).await;
    assert_eq!(tx["category"], "Subscription");
    assert_eq!(tx["category_source"], "ai");

    let response = app.oneshot(request()).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["cached"], true);
    assert_eq!(json["applied_count"], 0);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_categorize_merchant_without_provider() {
    let app = setup_app_with(Database::in_memory().unwrap(), None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/categorize_merchant",
            serde_json::json!({ "merchant_key": "SHELL" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/categorize_merchant",
            serde_json::json!({ "merchant_key": " " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_spending_insights_fall_back_to_rules() {
    let db = Database::in_memory().unwrap();
    insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -40.0);
    insert(&db, 1, date(2025, 11, 2), "PAYROLL DEPOSIT", 1000.0);
    insert(&db, 1, date(2025, 12, 2), "SHELL 555", -25.0);
    let app = setup_app_with(db, None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/insights",
            serde_json::json!({ "start_date": "2025-11-01", "end_date": "2025-11-30" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["source"], "rules");
    assert_eq!(
        json["insights"][0],
        "Your total spending for this period was $40.00."
    );
    assert_eq!(json["insights"][1], "Your total income was $1000.00.");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/insights",
            serde_json::json!({ "start_date": "2025-12-01", "end_date": "2025-11-01" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_spending_insights_from_http_provider() {
    let server = MockProviderServer::start_with_content(
        r#"{"insights": ["Groceries were your only expense."]}"#,
    )
    .await;
    let db = Database::in_memory().unwrap();
    insert(&db, 1, date(2025, 11, 1), "LOBLAWS", -40.0);
    let ai = AIClient::openai_compatible(&server.url(), "test-model");
    let app = setup_app_with(db, Some(ai));

    let response = app
        .oneshot(json_request("POST", "/api/insights", serde_json::json!({})))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["source"], "ai");
    assert_eq!(json["insights"][0], "Groceries were your only expense.");
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_recurring_insights_cached_per_user() {
    let db = Database::in_memory().unwrap();
    let today = Local::now().date_naive();
    for days_ago in [80, 50, 20] {
        insert(&db, 1, today - Days::new(days_ago), "SPOTIFY", -11.99);
    }
    let mock = MockBackend::new();
    let app = setup_app_with(db, Some(AIClient::Mock(mock.clone())));

    let response = app
        .clone()
        .oneshot(get("/api/recurring/insights"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["source"], "ai");
    assert_eq!(json["from_cache"], false);
    assert_eq!(json["summary"]["count"], 1);
    assert!(approx(&json["summary"]["total_monthly"], 11.99));

    let response = app
        .clone()
        .oneshot(get("/api/recurring/insights"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["from_cache"], true);
    assert_eq!(mock.calls(), 1);

    let response = app
        .clone()
        .oneshot(get("/api/recurring/insights?force_refresh=true"))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["from_cache"], false);
    assert_eq!(mock.calls(), 2);

    // User 2 has no payments and gets its own entry
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/recurring/insights")
                .header("x-user-id", "2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["summary"]["count"], 0);
    assert_eq!(json["insights"][0]["title"], "No Recurring Payments");
}
