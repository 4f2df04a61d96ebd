use crate::bounding_box::Detection;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("onnx runtime error: {0}")]
    Session(#[from] ort::Error),
    #[error("session mutex poisoned")]
    PoisonedSession,
    #[error("model has no output named `{0}`")]
    MissingOutput(String),
    #[error("unexpected output shape: {0}")]
    InvalidOutputShape(String),
    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),
}

/// Blocking inference over a single image. Implementations are shared
/// across requests and must tolerate concurrent calls.
pub trait ModelService: Send + Sync + Clone + 'static {
    fn predict(&self, image: &RgbImage, confidence: f32) -> Result<Vec<Detection>, ModelError>;
}
