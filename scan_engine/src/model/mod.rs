mod metadata;
#[cfg(feature = "onnx")]
mod onnx;
mod remote;
mod session;

pub use metadata::ModelMetadata;
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
pub use remote::HttpModelLoader;
pub use session::{ModelSession, ModelStatus};

use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Model is not ready")]
    NotReady,
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Unranked output of a single scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScore {
    pub label: String,
    pub score: f32,
}

impl RawScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[async_trait]
pub trait Model: Send + Sync + 'static {
    async fn predict(&self, frame: &Frame) -> Result<Vec<RawScore>, ModelError>;
}

#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    async fn load(&self) -> Result<Arc<dyn Model>, ModelError>;
}
