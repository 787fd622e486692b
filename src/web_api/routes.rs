//! API Routes

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures::stream;
use serde_json::json;
use std::convert::Infallible;

use crate::error::{Error, Result};
use crate::models::{ApiResponse, SetIntervalRequest};
use crate::state::AppState;

/// multipart/x-mixed-replace part boundary
const MJPEG_BOUNDARY: &str = "frame";

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(get_status))
        // Monitoring control
        .route("/api/monitoring/start", post(start_monitoring))
        .route("/api/monitoring/stop", post(stop_monitoring))
        .route("/api/monitoring/pause", post(pause_monitoring))
        .route("/api/monitoring/resume", post(resume_monitoring))
        .route("/api/monitoring/interval", put(set_interval))
        // History
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", get(get_history_entry))
        .route("/api/history/:id/image", get(get_history_image))
        // Camera
        .route("/api/camera/latest.jpg", get(latest_frame))
        .route("/api/camera/stream", get(camera_stream))
        .route("/api/camera/capture", post(manual_capture))
        // AI config
        .route("/api/config", get(get_config))
        .route("/api/config/reload", post(reload_config))
        // Alerts
        .route("/api/alerts/reset-cooldown", post(reset_alert_cooldown))
        .with_state(state)
}

// ========================================
// Monitoring
// ========================================

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.monitoring.status().await))
}

async fn start_monitoring(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.monitoring.start().await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn stop_monitoring(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.monitoring.stop().await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn pause_monitoring(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.monitoring.pause().await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn resume_monitoring(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.monitoring.resume().await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn set_interval(
    State(state): State<AppState>,
    Json(req): Json<SetIntervalRequest>,
) -> Result<impl IntoResponse> {
    let status = state.monitoring.set_interval(req.seconds).await?;
    Ok(Json(ApiResponse::success(status)))
}

// ========================================
// History
// ========================================

async fn list_history(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.history.list().await))
}

async fn get_history_entry(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let entry = state.history.get(id).await?;
    Ok(Json(ApiResponse::success(entry)))
}

async fn get_history_image(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response> {
    let data = state.history.get_image(id).await?;
    Ok(jpeg_response(data))
}

async fn clear_history(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let removed = state.history.clear().await?;
    Ok(Json(ApiResponse::success(json!({ "removed": removed }))))
}

// ========================================
// Camera
// ========================================

async fn latest_frame(State(state): State<AppState>) -> Result<Response> {
    let frame = state
        .frames
        .get()
        .ok_or_else(|| Error::NotFound("No recent camera frame".to_string()))?;
    Ok(jpeg_response(frame.data.to_vec()))
}

async fn manual_capture(State(state): State<AppState>) -> Result<Response> {
    let frame = state.monitoring.capture_manual().await?;
    Ok(jpeg_response(frame.data.to_vec()))
}

/// MJPEG stream fed by Frame Store updates
async fn camera_stream(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.frames.subscribe();

    let frames = stream::unfold((rx, true), |(mut rx, first)| async move {
        let mut wait = !first;
        loop {
            if wait && rx.changed().await.is_err() {
                return None;
            }
            wait = true;

            let frame = rx.borrow_and_update().clone();
            if let Some(frame) = frame {
                return Some((Ok::<_, Infallible>(mjpeg_part(&frame.data)), (rx, false)));
            }
        }
    });

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(frames),
    )
}

fn mjpeg_part(data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        data.len()
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn jpeg_response(data: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        data,
    )
        .into_response()
}

// ========================================
// Config & alerts
// ========================================

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.config_store.get().await))
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.config_store.reload().await))
}

async fn reset_alert_cooldown(State(state): State<AppState>) -> impl IntoResponse {
    state.alerts.reset_cooldown().await;
    Json(ApiResponse::success(json!({ "reset": true })))
}
