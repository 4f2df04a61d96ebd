use crate::{
    config::Config,
    inference_service::InferenceService,
    ort_service::OrtModelService,
    server::{shutdown_signal, HttpServer},
};
use std::error::Error;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let ort_model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to load detection model: {:?}", e);
            return Err(Box::new(e));
        }
    };
    let inference_service = InferenceService::new(ort_model_service);

    let server = HttpServer::new(inference_service, &config.server).await?;
    server.run(shutdown_signal()).await?;

    tracing::info!("Detection service stopped");
    Ok(())
}
