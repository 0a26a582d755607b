//! Notification routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryState, DeliveryStatus, SubmitNotification};
use herald_notifier::DeliveryStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(submit_notification))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/stats", get(notification_stats))
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}/retry", post(retry_notification))
        .route("/api/notifications/{id}/cancel", post(cancel_notification))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub state: Option<DeliveryState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

/// POST /api/notifications: Submit a notification. The response reflects
/// the first delivery attempt.
async fn submit_notification(
    State(state): State<AppState>,
    Json(submission): Json<SubmitNotification>,
) -> Result<(StatusCode, Json<DeliveryStatus>), AppError> {
    let status = state.engine.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// GET /api/notifications: List notifications, optionally by state.
async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<DeliveryStatus>> {
    Json(state.engine.list(query.state).await)
}

async fn notification_stats(State(state): State<AppState>) -> Json<DeliveryStats> {
    Json(state.engine.stats().await)
}

/// GET /api/notifications/{id}: Status with full attempt history.
async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryStatus>, AppError> {
    Ok(Json(state.engine.status(id).await?))
}

/// POST /api/notifications/{id}/retry: Attempt now on the current channel.
async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryStatus>, AppError> {
    Ok(Json(state.engine.manual_retry(id).await?))
}

/// POST /api/notifications/{id}/cancel: Abort. The body is optional.
async fn cancel_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<DeliveryStatus>, AppError> {
    let body: CancelBody = if body.iter().all(u8::is_ascii_whitespace) {
        CancelBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid cancel body: {}", e)))?
    };
    Ok(Json(state.engine.cancel(id, body.reason).await?))
}
