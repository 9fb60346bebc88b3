use super::ApiError;
use crate::{
    history::{HistoryError, HistoryRecord, ScanType, UserContext},
    server::SharedState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

/// Switches to `user` and warms the history cache for them. A failed fetch
/// does not fail the sign-in.
#[instrument(skip(state))]
pub async fn sign_in(State(state): State<SharedState>, Json(user): Json<UserContext>) -> StatusCode {
    tracing::info!("Signed in {}", user.user_id);
    state.engine.set_user(Some(user));

    if let Err(e) = state.engine.list_history(None).await {
        tracing::warn!("Could not prefetch scan history: {}", e);
    }
    StatusCode::NO_CONTENT
}

pub async fn sign_out(State(state): State<SharedState>) -> StatusCode {
    state.engine.set_user(None);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize, Debug)]
pub struct ListParams {
    limit: Option<usize>,
}

#[instrument(skip(state))]
pub async fn list_history(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    Ok(Json(state.engine.list_history(params.limit).await?))
}

#[derive(Deserialize, Debug)]
pub struct SaveRequest {
    scan_type: ScanType,
    #[serde(default)]
    image_ref: Option<String>,
}

/// Saves the currently published predictions.
#[instrument(skip(state))]
pub async fn save_result(
    State(state): State<SharedState>,
    Json(request): Json<SaveRequest>,
) -> Result<(StatusCode, Json<HistoryRecord>), ApiError> {
    let record = state
        .engine
        .save_current_result(request.scan_type, request.image_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.engine.user().is_none() {
        return Err(HistoryError::NotAuthenticated.into());
    }
    if state.engine.delete_history_entry(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("scan {}", id)))
    }
}
