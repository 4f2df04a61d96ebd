use crate::{
    bounding_box::BoundingBox,
    model_service::{ModelError, ModelService},
};
use image::RgbImage;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    /// Runs the model once and maps every retained detection to a
    /// [`BoundingBox`], keeping the model's ordering.
    pub fn detect(
        &self,
        image: &RgbImage,
        confidence: f32,
    ) -> Result<Vec<BoundingBox>, ModelError> {
        let detections = self.model_service.predict(image, confidence)?;

        tracing::debug!("Returning {} detections", detections.len());
        for (i, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.confidence,
                detection.x1,
                detection.y1,
                detection.x2,
                detection.y2
            );
        }

        Ok(detections.into_iter().map(BoundingBox::from).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bounding_box::Detection;
    use image::{ImageBuffer, Rgb};

    #[derive(Clone)]
    pub(crate) struct MockModelService {
        detections: Vec<Detection>,
    }

    impl MockModelService {
        pub(crate) fn new() -> Self {
            Self {
                detections: vec![
                    Detection {
                        x1: 10.7,
                        y1: 20.2,
                        x2: 100.9,
                        y2: 150.0,
                        class_id: 7,
                        confidence: 0.95,
                    },
                    Detection {
                        x1: 200.0,
                        y1: 50.5,
                        x2: 300.3,
                        y2: 200.8,
                        class_id: 42,
                        confidence: 0.5,
                    },
                ],
            }
        }
    }

    impl ModelService for MockModelService {
        fn predict(
            &self,
            _image: &RgbImage,
            confidence: f32,
        ) -> Result<Vec<Detection>, ModelError> {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(ModelError::InvalidThreshold(confidence));
            }
            Ok(self
                .detections
                .iter()
                .filter(|d| d.confidence > confidence)
                .copied()
                .collect())
        }
    }

    #[derive(Clone)]
    pub(crate) struct FailingModelService;

    impl ModelService for FailingModelService {
        fn predict(
            &self,
            _image: &RgbImage,
            _confidence: f32,
        ) -> Result<Vec<Detection>, ModelError> {
            Err(ModelError::MissingOutput("output0".to_string()))
        }
    }

    #[derive(Clone)]
    pub(crate) struct PanickingModelService;

    impl ModelService for PanickingModelService {
        fn predict(
            &self,
            _image: &RgbImage,
            _confidence: f32,
        ) -> Result<Vec<Detection>, ModelError> {
            panic!("session crashed");
        }
    }

    #[test]
    fn test_detect() {
        let inference_service = InferenceService::new(MockModelService::new());
        let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(320, 240);

        let boxes = inference_service.detect(&image, 0.25).unwrap();

        assert_eq!(
            boxes,
            vec![
                BoundingBox {
                    x1: 10,
                    y1: 20,
                    x2: 100,
                    y2: 150,
                    class_index: 7,
                    confidence: 0.95,
                },
                BoundingBox {
                    x1: 200,
                    y1: 50,
                    x2: 300,
                    y2: 200,
                    class_index: 42,
                    confidence: 0.5,
                },
            ]
        );
    }

    #[test]
    fn test_detect_forwards_threshold() {
        let inference_service = InferenceService::new(MockModelService::new());
        let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(320, 240);

        let boxes = inference_service.detect(&image, 0.9).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_index, 7);

        assert!(inference_service.detect(&image, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_detect_propagates_model_errors() {
        let inference_service = InferenceService::new(MockModelService::new());
        let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(1, 1);

        let result = inference_service.detect(&image, 2.0);
        assert!(matches!(result, Err(ModelError::InvalidThreshold(_))));

        let inference_service = InferenceService::new(FailingModelService);
        let result = inference_service.detect(&image, 0.5);
        assert!(matches!(result, Err(ModelError::MissingOutput(_))));
    }
}
