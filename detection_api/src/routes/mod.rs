mod detect;

use crate::{model_service::ModelService, server::SharedState};
use axum::{routing::post, Router};

pub use detect::{DetectError, DetectRequest, DetectResponse, DetectionData, Metadata};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new().route("/detect", post(detect::detect::<M>))
}
