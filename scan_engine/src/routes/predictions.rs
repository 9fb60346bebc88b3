use super::ApiError;
use crate::{frame::Frame, ranking::PredictionList, scan::ScanState, server::SharedState};
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct PredictionsView {
    predictions: PredictionList,
    processing: bool,
    scan: ScanState,
}

pub async fn current_predictions(State(state): State<SharedState>) -> Json<PredictionsView> {
    Json(PredictionsView {
        predictions: state.engine.current_predictions(),
        processing: state.engine.is_processing(),
        scan: state.engine.scan_state(),
    })
}

pub async fn clear_predictions(State(state): State<SharedState>) -> StatusCode {
    state.engine.clear_predictions();
    StatusCode::NO_CONTENT
}

/// Classifies an uploaded image. The body is the raw encoded image.
#[instrument(skip(state, image_data))]
pub async fn classify_image(
    State(state): State<SharedState>,
    image_data: Bytes,
) -> Result<Json<PredictionList>, ApiError> {
    let frame = Frame::decode(&image_data)?;
    let predictions = state
        .engine
        .classify_once(&frame)
        .await?
        .ok_or(ApiError::Busy)?;

    Ok(Json(predictions))
}
