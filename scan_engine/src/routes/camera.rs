use super::ApiError;
use crate::{camera::CameraError, ranking::PredictionList, scan::ScanState, server::SharedState};
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Serialize)]
pub struct CameraView {
    active: bool,
    scan: ScanState,
}

impl CameraView {
    fn of(state: &SharedState) -> Self {
        Self {
            active: state.camera.is_active(),
            scan: state.engine.scan_state(),
        }
    }
}

pub async fn start_camera(State(state): State<SharedState>) -> Json<CameraView> {
    state.camera.open();
    Json(CameraView::of(&state))
}

/// Receives one encoded frame from the capture side.
pub async fn push_frame(
    State(state): State<SharedState>,
    image_data: Bytes,
) -> Result<StatusCode, ApiError> {
    state.camera.push_encoded(&image_data)?;
    Ok(StatusCode::ACCEPTED)
}

/// Snapshots the latest frame and classifies it once.
#[instrument(skip(state))]
pub async fn capture_frame(
    State(state): State<SharedState>,
) -> Result<Json<PredictionList>, ApiError> {
    let still = state.camera.capture()?;
    let predictions = state
        .engine
        .classify_once(still.frame())
        .await?
        .ok_or(ApiError::Busy)?;

    Ok(Json(predictions))
}

pub async fn stop_camera(State(state): State<SharedState>) -> Json<CameraView> {
    state.engine.stop_continuous_scan();
    state.camera.stop();
    Json(CameraView::of(&state))
}

#[instrument(skip(state))]
pub async fn start_scan(State(state): State<SharedState>) -> Result<Json<CameraView>, ApiError> {
    let feed = state.camera.feed().ok_or(CameraError::NotActive)?;
    state.engine.start_continuous_scan(Arc::new(feed));
    Ok(Json(CameraView::of(&state)))
}

pub async fn stop_scan(State(state): State<SharedState>) -> Json<CameraView> {
    state.engine.stop_continuous_scan();
    Json(CameraView::of(&state))
}
