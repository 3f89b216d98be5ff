//! Integration tests for the workspace HTTP API

mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{extract_json_body, test_settings, TestApp};
use devbox_api::routes::workspace::{StopResponse, WorkspaceResponse};
use devbox_core::{Status, WorkloadInfo};
use devbox_proxmox::mock::Call;
use devbox_proxmox::ControlPlaneError;
use serde_json::Value;

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = extract_json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_readiness_follows_control_plane() {
    let app = TestApp::new().await;
    let response = app.get("/health/ready", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;
    assert_eq!(body["nodes_online"], 1);

    app.control_plane
        .fail_cluster_status(ControlPlaneError::Transport("connection refused".into()));
    let response = app.get("/health/ready", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_launch_without_identity_is_unauthorized() {
    let app = TestApp::new().await;
    let response = app.post("/api/v1/workspace", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.control_plane.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_forbidden() {
    let app = TestApp::new().await;
    let response = app.post("/api/v1/workspace", Some("mallory")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body: Value = extract_json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("mallory"));
    assert!(app.control_plane.calls().is_empty());
}

#[tokio::test]
async fn test_launch_creates_workspace_and_route() {
    let app = TestApp::new().await;

    let response = app.post("/api/v1/workspace", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let workspace: WorkspaceResponse = extract_json_body(response).await;
    assert_eq!(workspace.login, "alice");
    assert_eq!(workspace.guest_id, 42);
    assert_eq!(workspace.address, "10.0.0.42");
    assert_eq!(workspace.url, "https://alice.code.example.com");

    let routes = app.routes.lock().unwrap().clone();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["match"][0]["host"][0], "alice.code.example.com");
    assert_eq!(routes[0]["handle"][0]["upstreams"][0]["dial"], "10.0.0.42:8080");
}

#[tokio::test]
async fn test_repeated_launch_is_idempotent() {
    let app = TestApp::new().await;

    let first = app.post("/api/v1/workspace", Some("alice")).await;
    assert_eq!(first.status(), StatusCode::OK);
    app.control_plane.clear_calls();

    let second = app.post("/api/v1/workspace", Some("Alice")).await;
    assert_eq!(second.status(), StatusCode::OK);

    assert!(app.control_plane.mutating_calls().is_empty());
    assert_eq!(app.routes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_forwarded_user_header_is_accepted() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/workspace")
        .header("x-forwarded-user", "bob")
        .body(Body::empty())
        .unwrap();

    let response = app.send_request(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let info: WorkloadInfo = extract_json_body(response).await;
    assert_eq!(info.guest_id, 43);
    assert_eq!(info.status, Status::Missing);
}

#[tokio::test]
async fn test_workspace_status_after_launch() {
    let app = TestApp::new().await;
    app.post("/api/v1/workspace", Some("alice")).await;

    let response = app.get("/api/v1/workspace", Some("alice")).await;
    let info: WorkloadInfo = extract_json_body(response).await;
    assert_eq!(info.status, Status::Running);
    assert_eq!(info.name, "codeserver-alice");
}

#[tokio::test]
async fn test_stop_removes_route() {
    let app = TestApp::new().await;
    app.post("/api/v1/workspace", Some("alice")).await;
    app.post("/api/v1/workspace", Some("bob")).await;

    let response = app.post("/api/v1/workspace/stop", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stopped: StopResponse = extract_json_body(response).await;
    assert!(stopped.stopped);
    assert_eq!(stopped.routes_removed, 1);
    assert_eq!(app.control_plane.status_of(42), Status::Stopped);

    let routes = app.routes.lock().unwrap().clone();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["match"][0]["host"][0], "bob.code.example.com");
}

#[tokio::test]
async fn test_control_plane_failure_is_bad_gateway() {
    let app = TestApp::new().await;
    app.control_plane
        .fail_info(ControlPlaneError::Auth("ticket rejected".into()));

    let response = app.post("/api/v1/workspace", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.routes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_workspace_times_out() {
    let app = TestApp::new().await;
    app.control_plane.set_never_boots();

    let response = app.post("/api/v1/workspace", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(app.routes.lock().unwrap().is_empty());

    let calls = app.control_plane.calls();
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Start(42))).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_cancels_reconcile() {
    let mut settings = test_settings();
    settings.max_wait = Duration::from_secs(600);
    let app = TestApp::with_settings(settings, Duration::from_secs(5)).await;
    app.control_plane.set_never_boots();

    let response = app.post("/api/v1/workspace", Some("alice")).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}
