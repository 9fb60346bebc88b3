use super::{Model, ModelError, ModelLoader, ModelMetadata};
use crate::config::ModelConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use tracing::instrument;

/// Fetches `metadata.json` and the model artifact from the configured base URL.
#[derive(Debug, Clone)]
pub struct HttpModelLoader {
    http: Client,
    config: ModelConfig,
}

impl HttpModelLoader {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let http = Client::builder()
            .timeout(config.get_request_timeout())
            .build()
            .map_err(|e| ModelError::Load(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    async fn fetch_metadata(&self) -> Result<ModelMetadata, ModelError> {
        let url = self.config.get_metadata_url();
        let metadata = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ModelError::Load(format!("failed to fetch {}: {}", url, e)))?
            .json::<ModelMetadata>()
            .await
            .map_err(|e| ModelError::Load(format!("invalid model metadata: {}", e)))?;

        metadata.validate().map_err(ModelError::Load)?;
        tracing::debug!(
            "Fetched metadata for {:?} with {} labels",
            metadata.model_name,
            metadata.labels.len()
        );

        Ok(metadata)
    }

    async fn fetch_artifact(&self) -> Result<Bytes, ModelError> {
        let url = self.config.get_model_url();
        let artifact = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ModelError::Load(format!("failed to fetch {}: {}", url, e)))?
            .bytes()
            .await
            .map_err(|e| ModelError::Load(format!("failed to read model artifact: {}", e)))?;

        tracing::debug!("Fetched model artifact of {} bytes", artifact.len());
        Ok(artifact)
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    #[instrument(skip(self), fields(base_url = %self.config.base_url))]
    async fn load(&self) -> Result<Arc<dyn Model>, ModelError> {
        let metadata = self.fetch_metadata().await?;
        let artifact = self.fetch_artifact().await?;
        build_model(&artifact, metadata)
    }
}

#[cfg(feature = "onnx")]
fn build_model(artifact: &[u8], metadata: ModelMetadata) -> Result<Arc<dyn Model>, ModelError> {
    let model = super::OnnxModel::from_memory(artifact, metadata)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
fn build_model(_artifact: &[u8], _metadata: ModelMetadata) -> Result<Arc<dyn Model>, ModelError> {
    Err(ModelError::Load(
        "no inference backend compiled in, rebuild with the `onnx` feature".to_string(),
    ))
}
