//! Integration tests for gitviz-import API endpoints

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

use gitviz_common::config::TomlConfig;
use helpers::{remote_repos, FakeRemote, Harness, TEST_TOKEN};

/// Test helper: router over a harness with the test token in TOML
async fn create_test_app() -> (axum::Router, Harness) {
    let remote = FakeRemote::new().with_org("acme", remote_repos("acme", &["r1", "r2"]));
    let harness = Harness::with_real_clock(remote).await;

    let toml_config = TomlConfig {
        github_token: Some(TEST_TOKEN.to_string()),
        ..Default::default()
    };
    let state = gitviz_import::AppState::new(
        harness.pool.clone(),
        harness.store.clone(),
        harness.service.clone(),
        harness.event_bus.clone(),
        toml_config,
    );

    (gitviz_import::build_router(state), harness)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _harness) = create_test_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "gitviz-import");
    assert_eq!(json["active_imports"], 0);
    assert!(json.get("last_error").is_none());
}

#[tokio::test]
async fn test_start_rejects_empty_input() {
    let (app, harness) = create_test_app().await;

    let response = app
        .oneshot(post_json("/repositories/bulk-import", json!({ "account_input": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert_eq!(harness.service.registry().active_count(), 0);
}

#[tokio::test]
async fn test_start_and_poll_to_completion() {
    let (app, harness) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/repositories/bulk-import",
            json!({
                "account_input": "https://github.com/acme",
                "project_creation_mode": "single",
                "max_concurrent_clones": 2
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started = body_json(response).await;
    assert_eq!(started["status"], "initializing");
    assert_eq!(started["message"], "Bulk import started");
    let id = started["bulk_import_id"].as_str().unwrap().to_string();
    assert!(Uuid::parse_str(&id).is_ok());

    // Poll until the background job settles
    let mut last = Value::Null;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get(&format!("/repositories/bulk-import/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = body_json(response).await;
        if last["status"] == "completed" || last["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(last["status"], "completed", "{last}");
    assert_eq!(last["progress"], 100);
    assert_eq!(last["total_repos"], 2);
    assert_eq!(last["completed_repos"], 2);
    assert_eq!(last["owners"], json!(["acme"]));
    assert_eq!(last["repositories"][0]["status"], "completed");
    assert_eq!(last["created_projects"].as_array().unwrap().len(), 1);

    let response = app.clone().oneshot(get("/repositories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let repositories = body_json(response).await;
    assert_eq!(repositories.as_array().unwrap().len(), 2);

    let first_id = repositories[0]["id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(get(&format!("/repositories/{}", first_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["owner"], "acme");

    let response = app.oneshot(get("/projects")).await.unwrap();
    let projects = body_json(response).await;
    assert_eq!(projects[0]["name"], "acme");
    assert_eq!(projects[0]["repository_ids"].as_array().unwrap().len(), 2);

    assert_eq!(harness.checkout.call_count(), 2);
}

#[tokio::test]
async fn test_poll_unknown_job_returns_sentinel() {
    let (app, _harness) = create_test_app().await;

    for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let response = app
            .clone()
            .oneshot(get(&format!("/repositories/bulk-import/{}", id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "not_found", "error": "Bulk import not found or expired" })
        );
    }
}

#[tokio::test]
async fn test_get_repository_errors() {
    let (app, _harness) = create_test_app().await;

    let response = app.clone().oneshot(get("/repositories/bogus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get(&format!("/repositories/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_github_token_settings() {
    let (app, _harness) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/settings/github-token", json!({ "token": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            "/settings/github-token",
            json!({ "token": "ghp_abcdef123456" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    // Database token outranks ENV and TOML
    let response = app.oneshot(get("/settings/github-token")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["configured"], true);
    assert_eq!(json["masked_token"], "************3456");
}

#[tokio::test]
async fn test_event_stream_is_sse() {
    let (app, _harness) = create_test_app().await;

    let response = app.oneshot(get("/bulk-import/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
