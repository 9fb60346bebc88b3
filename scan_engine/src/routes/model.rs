use super::ApiError;
use crate::{model::ModelStatus, server::SharedState};
use axum::{extract::State, Json};
use tracing::instrument;

pub async fn model_status(State(state): State<SharedState>) -> Json<ModelStatus> {
    Json(state.engine.model_status())
}

/// Loads the model, or retries a failed load.
#[instrument(skip(state))]
pub async fn load_model(State(state): State<SharedState>) -> Result<Json<ModelStatus>, ApiError> {
    state.engine.load_model().await?;
    Ok(Json(state.engine.model_status()))
}
