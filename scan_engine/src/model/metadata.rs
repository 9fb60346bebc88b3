use super::{ModelError, RawScore};
use serde::{Deserialize, Serialize};

fn default_image_size() -> u32 {
    224
}

/// Contents of the `metadata.json` published next to an exported classifier.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub tfjs_version: Option<String>,
    #[serde(default)]
    pub tm_version: Option<String>,
    #[serde(default)]
    pub package_version: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<String>,
    pub labels: Vec<String>,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

impl ModelMetadata {
    pub fn validate(&self) -> Result<(), String> {
        if self.labels.is_empty() {
            return Err("metadata declares no labels".to_string());
        }
        if self.image_size == 0 {
            return Err("metadata declares a zero image size".to_string());
        }
        Ok(())
    }

    /// Pairs one score per label, in label order.
    pub fn label_scores(&self, scores: &[f32]) -> Result<Vec<RawScore>, ModelError> {
        if scores.len() != self.labels.len() {
            return Err(ModelError::Inference(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        Ok(self
            .labels
            .iter()
            .zip(scores)
            .map(|(label, score)| RawScore::new(label.clone(), *score))
            .collect())
    }
}
