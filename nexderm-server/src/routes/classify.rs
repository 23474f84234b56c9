//! Image classification endpoint
//!
//! Accepts a multipart upload, runs it through the inference service, and
//! returns the winning label with its confidence. The checkpoint is loaded
//! lazily on the first request that reaches the service.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::routes::ApiError;
use crate::state::SharedState;

/// Fixed advisory attached to every classification response
const ADVISORY: &str = "This is a demo response. Please consult a dermatologist.";

#[derive(Serialize)]
pub struct ClassifyResponse {
    pub label: String,
    pub confidence: f32,
    pub advisory: String,
}

/// POST /api/v1/classify - Classify an uploaded lesion image
///
/// Expects a multipart form with a file field (conventionally named
/// `file`); the first field carrying data is used.
pub async fn classify(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(nexderm::error::NexDermError::UnsupportedImage(e.to_string())))?
    {
        let data = field.bytes().await.map_err(|e| {
            ApiError(nexderm::error::NexDermError::UnsupportedImage(e.to_string()))
        })?;
        if !data.is_empty() {
            bytes = Some(data.to_vec());
            break;
        }
    }

    let bytes = bytes.ok_or_else(|| {
        ApiError(nexderm::error::NexDermError::UnsupportedImage(
            "no file field in multipart upload".to_string(),
        ))
    })?;

    let prediction = state.service.predict_from_bytes(&bytes)?;
    info!(
        "Classified upload ({} bytes): {} ({:.3})",
        bytes.len(),
        prediction.label,
        prediction.confidence
    );

    Ok(Json(ClassifyResponse {
        label: prediction.label,
        confidence: prediction.confidence,
        advisory: ADVISORY.to_string(),
    }))
}

/// Fallback for GET on the classify route, mirroring a 405 with guidance
pub async fn classify_usage() -> (StatusCode, &'static str) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "POST a multipart form with an image file to this endpoint",
    )
}
