//! Error handling for the print watchdog

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera lease is held by another purpose
    #[error("Camera busy: {0}")]
    CameraBusy(String),

    /// Camera device missing or misconfigured
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Capture subprocess did not finish in time
    #[error("Capture timeout: {0}")]
    CaptureTimeout(String),

    /// Capture produced unusable output
    #[error("Capture decode error: {0}")]
    CaptureDecode(String),

    /// Analysis service did not answer in time (after retries)
    #[error("Analysis timeout: {0}")]
    AnalysisTimeout(String),

    /// Analysis service returned an error (after retries)
    #[error("Analysis service error: {0}")]
    AnalysisService(String),

    /// Configuration invalid
    #[error("Config invalid: {0}")]
    ConfigInvalid(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting state transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::camera_gateway::CameraError> for Error {
    fn from(e: crate::camera_gateway::CameraError) -> Self {
        use crate::camera_gateway::CameraError;

        match e {
            CameraError::Busy { .. } => Error::CameraBusy(e.to_string()),
            CameraError::DeviceUnavailable(_) => Error::CameraUnavailable(e.to_string()),
            CameraError::Timeout(_) => Error::CaptureTimeout(e.to_string()),
            CameraError::DecodeFailed(_) => Error::CaptureDecode(e.to_string()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::CameraBusy(msg) => (StatusCode::CONFLICT, "CAMERA_BUSY", msg.clone()),
            Error::CameraUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CAMERA_UNAVAILABLE",
                msg.clone(),
            ),
            Error::CaptureTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                "CAPTURE_TIMEOUT",
                msg.clone(),
            ),
            Error::CaptureDecode(msg) => (
                StatusCode::BAD_GATEWAY,
                "CAPTURE_DECODE_ERROR",
                msg.clone(),
            ),
            Error::AnalysisTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                "ANALYSIS_TIMEOUT",
                msg.clone(),
            ),
            Error::AnalysisService(msg) => (
                StatusCode::BAD_GATEWAY,
                "ANALYSIS_SERVICE_ERROR",
                msg.clone(),
            ),
            Error::ConfigInvalid(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_INVALID",
                msg.clone(),
            ),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        // Lease contention and missing resources are expected outcomes
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::debug!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_gateway::{CameraError, LeasePurpose};

    #[test]
    fn test_camera_error_mapping() {
        let busy: Error = CameraError::Busy {
            requested: LeasePurpose::Manual,
            held_by: Some(LeasePurpose::Preview),
        }
        .into();
        assert!(matches!(busy, Error::CameraBusy(_)));

        let missing: Error = CameraError::DeviceUnavailable("no cameras".to_string()).into();
        assert!(matches!(missing, Error::CameraUnavailable(_)));

        let timeout: Error = CameraError::Timeout(8).into();
        assert!(matches!(timeout, Error::CaptureTimeout(_)));
    }

    #[test]
    fn test_status_codes() {
        let resp = Error::CameraBusy("preview".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = Error::NotFound("history entry 7".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = Error::CameraUnavailable("no device".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
