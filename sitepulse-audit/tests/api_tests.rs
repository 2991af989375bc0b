//! Integration tests for the HTTP API
//!
//! Exercises the router with in-process requests; no outbound network
//! calls are made (handlers that would reach external APIs are only
//! tested on their validation paths).

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use sitepulse_audit::{build_router, AppState};
use sitepulse_common::db::init_database;
use sitepulse_common::events::EventBus;

async fn test_app() -> (tempfile::TempDir, axum::Router, sqlx::SqlitePool) {
    let tmp = tempfile::tempdir().unwrap();
    let pool = init_database(&tmp.path().join("sitepulse.db")).await.unwrap();
    let state = AppState::new(pool.clone(), EventBus::new(64));
    (tmp, build_router(state), pool)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_module_and_uptime() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "sitepulse-audit");
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn unknown_analysis_returns_404() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/audit/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_analysis_runs_return_404() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/audit/{}/runs", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_audit_rejects_invalid_url() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/audit")
                .header("content-type", "application/json")
                .body(Body::from(json!({"url": "not a url"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn start_audit_rejects_non_http_scheme() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/audit")
                .header("content-type", "application/json")
                .body(Body::from(json!({"url": "ftp://example.com"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_of_unknown_analysis_returns_404() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/audit/{}/cancel", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_of_terminal_analysis_returns_409() {
    let (_tmp, app, pool) = test_app().await;

    // A completed bundle with no live cancellation token
    let target = sitepulse_common::AuditTarget::new("https://example.com", None).unwrap();
    let mut bundle =
        sitepulse_audit::models::AnalysisBundle::new(Uuid::new_v4(), &target);
    bundle.complete();
    sitepulse_audit::db::bundles::save_bundle(&pool, &bundle)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/audit/{}/cancel", bundle.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("completed"));
}

#[tokio::test]
async fn completed_analysis_round_trips_through_api() {
    let (_tmp, app, pool) = test_app().await;

    let target = sitepulse_common::AuditTarget::new("https://example.com", None).unwrap();
    let mut bundle =
        sitepulse_audit::models::AnalysisBundle::new(Uuid::new_v4(), &target);
    bundle.scores = Some(sitepulse_audit::models::ScoreCard {
        performance: 92,
        security: 0,
        seo: 65,
        ux: 64,
        maps_presence: 0,
        overall: 52,
    });
    bundle.complete();
    sitepulse_audit::db::bundles::save_bundle(&pool, &bundle)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/audit/{}", bundle.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["scores"]["overall"], 52);
    assert_eq!(json["url"], "https://example.com/");
}

#[tokio::test]
async fn settings_rejects_unknown_provider() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/settings/sentiment/api_key")
                .header("content-type", "application/json")
                .body(Body::from(json!({"api_key": "some-key"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_rejects_blank_key() {
    let (_tmp, app, _pool) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/settings/openai/api_key")
                .header("content-type", "application/json")
                .body(Body::from(json!({"api_key": "   "}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
