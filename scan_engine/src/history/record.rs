use crate::ranking::Prediction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Camera,
    Upload,
}

/// Identity of the signed-in user, supplied by whoever authenticates.
#[derive(Clone, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }
}

impl fmt::Debug for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserContext")
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Rows keep each prediction as `{className, probability}`, the shape the
/// web client writes. Reading accepts either key through the alias on
/// `Prediction::label`.
mod stored_predictions {
    use crate::ranking::Prediction;
    use serde::{ser::SerializeSeq, Serialize, Serializer};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct StoredPrediction<'a> {
        class_name: &'a str,
        probability: f32,
    }

    pub fn serialize<S: Serializer>(
        predictions: &[Prediction],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(predictions.len()))?;
        for prediction in predictions {
            seq.serialize_element(&StoredPrediction {
                class_name: &prediction.label,
                probability: prediction.probability,
            })?;
        }
        seq.end()
    }
}

/// One persisted scan, as stored in the `scan_history` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    #[serde(serialize_with = "stored_predictions::serialize")]
    pub predictions: Vec<Prediction>,
    #[serde(rename = "top_prediction")]
    pub top_label: String,
    pub top_confidence: f32,
    pub scan_type: ScanType,
    #[serde(rename = "image_url", default)]
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewHistoryRecord {
    pub user_id: String,
    #[serde(serialize_with = "stored_predictions::serialize")]
    pub predictions: Vec<Prediction>,
    #[serde(rename = "top_prediction")]
    pub top_label: String,
    pub top_confidence: f32,
    pub scan_type: ScanType,
    #[serde(rename = "image_url")]
    pub image_ref: Option<String>,
}

impl NewHistoryRecord {
    /// `None` when there is nothing to record.
    pub fn from_predictions(
        user_id: &str,
        predictions: &[Prediction],
        scan_type: ScanType,
        image_ref: Option<String>,
    ) -> Option<Self> {
        let top = predictions.first()?;
        Some(Self {
            user_id: user_id.to_string(),
            predictions: predictions.to_vec(),
            top_label: top.label.clone(),
            top_confidence: top.probability,
            scan_type,
            image_ref,
        })
    }

    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id,
            user_id: self.user_id,
            predictions: self.predictions,
            top_label: self.top_label,
            top_confidence: self.top_confidence,
            scan_type: self.scan_type,
            image_ref: self.image_ref,
            created_at,
        }
    }
}
