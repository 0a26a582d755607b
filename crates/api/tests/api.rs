//! Route tests.
//!
//! Uses `tower::ServiceExt` to drive the Axum router without a real HTTP
//! server, against the in-memory store and scripted adapters.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use herald_api::routes::create_router;
use herald_api::state::AppState;
use herald_common::config::BrandingConfig;
use herald_common::types::{ChannelKind, RetryPolicy};
use herald_formatter::{Formatter, RenderedMessage};
use herald_notifier::{
    AdapterSet, ChannelAdapter, DeliveryEngine, MemoryStore, NotificationRegistry, SendOutcome,
};

// ============================================================
// Helpers
// ============================================================

struct Fixed(ChannelKind, SendOutcome);

#[async_trait]
impl ChannelAdapter for Fixed {
    fn kind(&self) -> ChannelKind {
        self.0
    }

    async fn send(&self, _message: &RenderedMessage, _address: &str) -> SendOutcome {
        self.1.clone()
    }
}

/// Telegram always delivers, email always fails transiently.
fn app() -> Router {
    let registry = Arc::new(NotificationRegistry::new(Arc::new(MemoryStore::new())));
    let adapters = AdapterSet::new()
        .with(Arc::new(Fixed(
            ChannelKind::Telegram,
            SendOutcome::Delivered {
                provider_message_id: Some("tg-1".to_string()),
            },
        )))
        .with(Arc::new(Fixed(
            ChannelKind::Email,
            SendOutcome::transient("HTTP 503"),
        )));
    let engine = DeliveryEngine::new(
        registry,
        Formatter::new(BrandingConfig::default()),
        adapters,
        RetryPolicy::default(),
    );
    create_router(AppState::new(Arc::new(engine)))
}

fn submission(channel: &str) -> Value {
    json!({
        "recipient": {
            "name": "Ada",
            "addresses": { "telegram": "42", "email": "ada@example.com" }
        },
        "channels": [channel],
        "payload": { "kind": "follow_up", "message": "Your slot is confirmed." }
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================
// Route tests
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "herald-api");
}

#[tokio::test]
async fn test_submit_and_fetch() {
    let app = app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/notifications",
        Some(submission("telegram")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["state"], "delivered");
    assert_eq!(json["delivered_via"], "telegram");
    assert_eq!(json["attempts"].as_array().unwrap().len(), 1);

    let id = json["notification_id"].as_str().unwrap();
    let (status, fetched) = send(&app, "GET", &format!("/api/notifications/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["attempts"][0]["provider_message_id"], "tg-1");
}

#[tokio::test]
async fn test_missing_template_field_is_unprocessable() {
    let mut body = submission("telegram");
    body["payload"] = json!({ "kind": "follow_up" });
    let app = app();

    let (status, json) = send(&app, "POST", "/api/notifications", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("message"));

    let (_, list) = send(&app, "GET", "/api/notifications", None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_address_is_bad_request() {
    let mut body = submission("whatsapp");
    body["channels"] = json!(["whatsapp"]);
    let (status, _) = send(&app(), "POST", "/api/notifications", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let (status, json) = send(
        &app(),
        "GET",
        &format!("/api/notifications/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_list_filter_retry_and_cancel() {
    let app = app();
    send(&app, "POST", "/api/notifications", Some(submission("telegram"))).await;
    let (_, retrying) = send(&app, "POST", "/api/notifications", Some(submission("email"))).await;
    let id = retrying["notification_id"].as_str().unwrap().to_string();
    assert_eq!(retrying["state"], "failed_retrying");

    let (status, list) = send(&app, "GET", "/api/notifications?state=failed_retrying", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["notification_id"], id.as_str());

    let (status, retried) = send(&app, "POST", &format!("/api/notifications/{}/retry", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retried["attempts"].as_array().unwrap().len(), 2);

    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/api/notifications/{}/cancel", id),
        Some(json!({ "reason": "duplicate" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["state"], "exhausted");
    assert_eq!(cancelled["terminal_reason"]["kind"], "aborted");
    assert_eq!(cancelled["terminal_reason"]["reason"], "duplicate");

    let (status, _) = send(&app, "POST", &format!("/api/notifications/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "POST", &format!("/api/notifications/{}/retry", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let app = app();
    send(&app, "POST", "/api/notifications", Some(submission("telegram"))).await;
    send(&app, "POST", "/api/notifications", Some(submission("email"))).await;

    let (status, stats) = send(&app, "GET", "/api/notifications/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_state"]["delivered"], 1);
    assert_eq!(stats["by_state"]["failed_retrying"], 1);
    assert_eq!(stats["by_state"]["pending"], 0);
    assert_eq!(stats["by_channel"]["telegram"]["success_rate"], 1.0);
    assert_eq!(stats["mean_attempts_to_success"], 1.0);
}
