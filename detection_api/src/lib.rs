mod routes;
mod server;

pub mod app;
pub mod bounding_box;
pub mod config;
pub mod image_decoder;
pub mod inference_service;
pub mod model_service;
pub mod ort_service;

pub use app::start_app;
pub use routes::{DetectError, DetectRequest, DetectResponse, DetectionData, Metadata};
