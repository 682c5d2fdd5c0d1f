//! HTTP endpoint tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use deploybot::server::serve::router;
use deploybot::server::state::ServerState;

use crate::support::{harness, Harness, BOT_SOURCE, TOKEN};

const TRANSPORT_TOKEN: &str = "chat-secret";

fn app(h: &Harness) -> Router {
    let state = ServerState::new(
        h.app.dispatcher.clone(),
        h.app.outbox.clone(),
        h.app.control.clone(),
        h.app.store.clone(),
    )
    .with_transport_token(SecretString::from(TRANSPORT_TOKEN));
    router(Arc::new(state))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", TRANSPORT_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn event(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/events")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", TRANSPORT_TOKEN))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn say(app: &Router, owner: i64, text: &str) -> String {
    let (status, body) = send(app, event(json!({ "type": "text", "owner": owner, "text": text }))).await;
    assert_eq!(status, StatusCode::OK);
    body["replies"][0]["text"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health_and_version() {
    let h = harness().build().await;
    let app = app(&h);

    let (status, body) = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "deploybot");

    let (status, body) = send(&app, Request::builder().uri("/version").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_transport_requires_token() {
    let h = harness().build().await;
    let app = app(&h);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/events")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "type": "text", "owner": 1, "text": "/help" }).to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a short token, a one-byte difference and a longer token sharing the prefix
    for presented in ["wrong", "chat-secreT", "chat-secret-and-more"] {
        let request = Request::builder()
            .uri("/v1/owners/1/outbox")
            .header("authorization", format!("Bearer {}", presented))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {:?} was accepted", presented);
    }
}

#[tokio::test]
async fn test_deploy_over_http() {
    let h = harness().build().await;
    let app = app(&h);

    assert!(say(&app, 5, "/deploy").await.contains("step 1 of 4"));
    assert!(say(&app, 5, "demo-bot").await.contains("step 2 of 4"));
    assert!(say(&app, 5, TOKEN).await.contains("@demo_helper_bot"));

    let (status, body) = send(
        &app,
        event(json!({
            "type": "file",
            "owner": 5,
            "filename": "main.py",
            "content": STANDARD.encode(BOT_SOURCE),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["replies"][0]["text"].as_str().unwrap().contains("main.py"));

    assert!(say(&app, 5, "/done").await.contains("CONFIRM"));
    assert!(say(&app, 5, "CONFIRM").await.contains("started"));
    h.app.supervisor.wait(5, "demo-bot").await;

    let (status, body) = send(&app, get("/v1/owners/5/outbox")).await;
    assert_eq!(status, StatusCode::OK);
    let replies = body["replies"].as_array().unwrap();
    assert!(replies.iter().any(|r| r["text"].as_str().unwrap().contains("is live")));

    // drained
    let (_, body) = send(&app, get("/v1/owners/5/outbox")).await;
    assert!(body["replies"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, get("/deployments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let listed = &body["deployments"][0];
    assert_eq!(listed["name"], "demo-bot");
    assert_eq!(listed["status"], "running");
    assert!(listed.get("token").is_none());
    assert!(listed.get("files").is_none());

    let (status, body) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_deployments"], 1);
    assert_eq!(body["running"], 1);
    assert!(body["memory_mb"].is_number());
}

#[tokio::test]
async fn test_chat_commands_over_http() {
    let h = harness().build().await;
    let app = app(&h);

    assert!(say(&app, 5, "/mybots").await.contains("haven't deployed"));
    assert!(say(&app, 5, "/status").await.starts_with("Usage: /status"));
    assert!(say(&app, 5, "/logs ghost-bot").await.contains("not found"));
    assert!(say(&app, 5, "/frobnicate").await.contains("Unknown command"));
    assert!(say(&app, 5, "hello").await.contains("/deploy"));

    let (_, body) = send(&app, event(json!({ "type": "button", "owner": 5, "data": "delete_bot_ghost-bot" }))).await;
    assert!(body["replies"][0]["text"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_bad_file_content_is_rejected() {
    let h = harness().build().await;
    let app = app(&h);

    let (status, _) = send(
        &app,
        event(json!({ "type": "file", "owner": 5, "filename": "main.py", "content": "%%% not base64" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
