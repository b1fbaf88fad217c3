mod common;

use axum::http::StatusCode;
use common::*;
use statement_service::services::{init_metrics, InMemoryJobStore};

#[tokio::test]
async fn test_root_describes_service() {
    let app = TestApp::spawn().await;

    let response = app.get("/", None, false).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "statement-service");
    assert_eq!(body["status"], "running");
    assert_eq!(body["environment"], "test");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_check_reports_store() {
    let app = TestApp::spawn().await;

    let response = app.get("/health", None, false).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_simple_health_check() {
    let app = TestApp::spawn().await;

    let response = app.get("/health/simple", None, false).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_job_counters() {
    init_metrics().expect("Failed to install metrics recorder");
    let app = TestApp::spawn().await;

    let form = ledger_form().part("file", pdf_part("march.pdf", PDF_BYTES));
    let upload = app.post_form(EXTRACT_PATH, form, Some(app.user_id)).await;
    assert_eq!(upload.status(), StatusCode::OK);

    let response = app.get("/metrics", None, false).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").starts_with("text/plain"));

    let text = response.text().await.unwrap();
    assert!(text.contains("statement_jobs_total"));
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_request_id_is_echoed_or_minted() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health/simple", app.address))
        .header("x-request-id", "req-42")
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(header(&response, "x-request-id"), "req-42");

    let response = app.get("/health/simple", None, false).await;
    assert!(!header(&response, "x-request-id").is_empty());
}

#[tokio::test]
async fn test_uploads_are_rate_limited_per_ip() {
    let app = TestApp::with_store(InMemoryJobStore::new(), 2).await;

    let upload_from = |ip: &'static str| {
        let form = ledger_form().part("file", file_part("notes.txt", "text/plain", b"x"));
        app.client
            .post(format!("{}{}", app.address, EXTRACT_PATH))
            .header("X-User-ID", app.user_id.to_string())
            .header("X-Forwarded-For", ip)
            .multipart(form)
            .send()
    };

    assert_eq!(upload_from("203.0.113.7").await.unwrap().status(), StatusCode::BAD_REQUEST);
    assert_eq!(upload_from("203.0.113.7").await.unwrap().status(), StatusCode::BAD_REQUEST);

    let limited = upload_from("203.0.113.7").await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(!header(&limited, "retry-after").is_empty());

    // Other clients and non-upload routes are unaffected.
    assert_eq!(upload_from("198.51.100.1").await.unwrap().status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.get("/api/dashboard/stats", Some(app.user_id), false).await.status(),
        StatusCode::OK
    );
}
