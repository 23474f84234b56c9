//! HTTP route handlers

pub mod classify;
pub mod health;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nexderm::error::NexDermError;
use serde_json::json;
use tracing::error;

/// Error wrapper that maps library errors onto HTTP responses.
///
/// Client mistakes (bad upload) map to 4xx; a missing or unreadable
/// checkpoint means the service cannot serve and maps to 503. Internal
/// details like filesystem paths never reach the response body.
pub struct ApiError(pub NexDermError);

impl From<NexDermError> for ApiError {
    fn from(err: NexDermError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            NexDermError::UnsupportedImage(_) => (
                StatusCode::BAD_REQUEST,
                "uploaded file is not a supported image".to_string(),
            ),
            NexDermError::ArtifactNotFound(_)
            | NexDermError::CorruptArtifact(_)
            | NexDermError::ModelNotLoaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                "classification model is not available".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
