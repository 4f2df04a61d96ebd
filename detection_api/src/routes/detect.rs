use crate::{
    bounding_box::BoundingBox,
    image_decoder::{decode_data_url, image_shape, DecodeError},
    model_service::{ModelError, ModelService},
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectRequest {
    pub base64_img: String,
    #[serde(rename = "confianca")]
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectResponse {
    pub metadata: Metadata,
    pub data: DetectionData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    pub image_shape: [u32; 3],
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionData {
    pub bounding_boxes: Vec<BoundingBox>,
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
    #[error("confianca must be within [0, 1], got {0}")]
    InvalidConfidence(f32),
    #[error("invalid base64_img: {0}")]
    Decode(#[from] DecodeError),
    #[error("detection failed: {0}")]
    Model(#[from] ModelError),
    #[error("detection task failed: {0}")]
    Worker(#[from] JoinError),
}

impl DetectError {
    fn status(&self) -> StatusCode {
        match self {
            DetectError::InvalidBody(rejection)
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE =>
            {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            DetectError::InvalidBody(_)
            | DetectError::InvalidConfidence(_)
            | DetectError::Decode(_)
            | DetectError::Model(ModelError::InvalidThreshold(_)) => StatusCode::BAD_REQUEST,
            DetectError::Model(_) | DetectError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Detection request failed: {}", self);
        } else {
            tracing::warn!("Rejected detection request: {}", self);
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[instrument(skip(state, payload))]
pub async fn detect<M: ModelService>(
    State(state): State<SharedState<M>>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, DetectError> {
    let Json(request) = payload?;
    if !(0.0..=1.0).contains(&request.confidence) {
        return Err(DetectError::InvalidConfidence(request.confidence));
    }

    let inference_service = state.inference_service.clone();
    let response = tokio::task::spawn_blocking(move || -> Result<DetectResponse, DetectError> {
        let image = decode_data_url(&request.base64_img)?;
        let bounding_boxes = inference_service.detect(&image, request.confidence)?;

        Ok(DetectResponse {
            metadata: Metadata {
                image_shape: image_shape(&image),
            },
            data: DetectionData { bounding_boxes },
        })
    })
    .await??;

    tracing::info!(
        "Detected {} objects in {:?} image",
        response.data.bounding_boxes.len(),
        response.metadata.image_shape
    );

    Ok(Json(response))
}
