use super::{Model, ModelError, ModelMetadata, RawScore};
use crate::frame::Frame;
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::Mutex;

/// Scales a frame to the model's square input, NHWC, channels in `[-1, 1]`.
fn transform_frame(frame: &Frame, size: u32) -> Array<f32, Ix4> {
    let resized = imageops::resize(frame.image(), size, size, FilterType::CatmullRom);

    let side = size as usize;
    let mut input = Array::zeros((1, side, side, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, y, x, 0]] = (r as f32) / 127.5 - 1.;
        input[[0, y, x, 1]] = (g as f32) / 127.5 - 1.;
        input[[0, y, x, 2]] = (b as f32) / 127.5 - 1.;
    }

    input
}

/// Passes probabilities through untouched, softmaxes anything else.
fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let normalized = scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if normalized {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

pub struct OnnxModel {
    session: Mutex<Session>,
    metadata: ModelMetadata,
}

impl OnnxModel {
    pub fn from_memory(artifact: &[u8], metadata: ModelMetadata) -> Result<Self, ModelError> {
        let load_error = |e: ort::Error| ModelError::Load(format!("failed to build ONNX session: {}", e));
        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .commit_from_memory(artifact)
            .map_err(load_error)?;

        tracing::info!(
            "Created ONNX session for {} labels at {}px",
            metadata.labels.len(),
            metadata.image_size
        );

        Ok(Self {
            session: Mutex::new(session),
            metadata,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(format!("inference failed: {}", e)))?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

#[async_trait]
impl Model for OnnxModel {
    async fn predict(&self, frame: &Frame) -> Result<Vec<RawScore>, ModelError> {
        let input = transform_frame(frame, self.metadata.image_size);
        let scores = self.run_inference(&input)?;
        self.metadata.label_scores(&to_probabilities(&scores))
    }
}
