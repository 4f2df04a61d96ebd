use crate::{
    bounding_box::Detection,
    config::{ModelConfig, Validatable},
    model_service::{ModelError, ModelService},
};
use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{s, Array, Array2, Array3, ArrayView2, Axis, Ix4};
use ort::{
    execution_providers::ExecutionProviderDispatch,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

fn transform_image(image: &RgbImage, input_size: u32) -> Array<f32, Ix4> {
    let resized = imageops::resize(image, input_size, input_size, FilterType::CatmullRom);

    let size = input_size as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Turns a `[4 + classes, candidates]` YOLO head into detections in
/// original image coordinates.
#[derive(Debug, Clone)]
pub(crate) struct OutputDecoder {
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub agnostic_nms: bool,
}

impl OutputDecoder {
    fn from_config(model_config: &ModelConfig) -> Self {
        Self {
            input_size: model_config.input_size,
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
            agnostic_nms: model_config.agnostic_nms,
        }
    }

    pub fn decode(
        &self,
        output: ArrayView2<f32>,
        confidence: f32,
        img_width: u32,
        img_height: u32,
    ) -> Vec<Detection> {
        let x_scale = img_width as f32 / self.input_size as f32;
        let y_scale = img_height as f32 / self.input_size as f32;
        let max_x = img_width as f32;
        let max_y = img_height as f32;

        let mut candidates = Vec::new();
        for column in output.axis_iter(Axis(1)) {
            let best = column
                .slice(s![4..])
                .iter()
                .copied()
                .enumerate()
                .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });

            let Some((class_id, prob)) = best else {
                continue;
            };
            if prob <= confidence {
                continue;
            }

            let xc = column[0] * x_scale;
            let yc = column[1] * y_scale;
            let w = column[2] * x_scale;
            let h = column[3] * y_scale;

            candidates.push(Detection {
                x1: (xc - w / 2.).clamp(0., max_x),
                y1: (yc - h / 2.).clamp(0., max_y),
                x2: (xc + w / 2.).clamp(0., max_x),
                y2: (yc + h / 2.).clamp(0., max_y),
                class_id: class_id as u32,
                confidence: prob,
            });
        }

        self.non_max_suppression(candidates)
    }

    fn non_max_suppression(&self, mut candidates: Vec<Detection>) -> Vec<Detection> {
        candidates.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

        let mut kept: Vec<Detection> = Vec::new();
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }
            let suppressed = kept.iter().any(|existing| {
                (self.agnostic_nms || existing.class_id == candidate.class_id)
                    && existing.iou(&candidate) > self.iou_threshold
            });
            if !suppressed {
                kept.push(candidate);
            }
        }

        kept
    }
}

fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();

    #[cfg(feature = "tensorrt")]
    providers.push(
        ort::execution_providers::TensorRTExecutionProvider::default()
            .with_engine_cache(true)
            .build(),
    );

    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());

    providers
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    decoder: OutputDecoder,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        ort::init()
            .with_name("detection_api")
            .with_execution_providers(execution_providers())
            .commit()?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let mut builder =
                    Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
                if let Some(threads) = model_config.intra_threads {
                    builder = builder.with_intra_threads(threads)?;
                }
                let session = builder.commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: model_config.output_name.clone(),
            decoder: OutputDecoder::from_config(model_config),
        })
    }

    /// Runs one forward pass and returns the head for the single image in
    /// the batch, shaped `[4 + classes, candidates]`.
    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Array2<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|_| ModelError::PoisonedSession)?;

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ModelError::MissingOutput(self.output_name.clone()))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let &[batch, rows, candidates] = dims.as_slice() else {
            return Err(ModelError::InvalidOutputShape(format!(
                "expected 3 dimensions, got {:?}",
                dims
            )));
        };
        if batch != 1 || rows < 5 {
            return Err(ModelError::InvalidOutputShape(format!(
                "expected [1, 4 + classes, candidates], got {:?}",
                dims
            )));
        }

        let array = Array3::from_shape_vec((batch, rows, candidates), data.to_vec())
            .map_err(|e| ModelError::InvalidOutputShape(e.to_string()))?;

        Ok(array.index_axis_move(Axis(0), 0))
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, image: &RgbImage, confidence: f32) -> Result<Vec<Detection>, ModelError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ModelError::InvalidThreshold(confidence));
        }

        let input = transform_image(image, self.decoder.input_size);
        let output = self.run_inference(&input)?;

        Ok(self
            .decoder
            .decode(output.view(), confidence, image.width(), image.height()))
    }
}
