use super::ApiError;
use crate::server::SharedState;
use axum::extract::State;

pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, ApiError> {
    Ok(state.metrics.render()?)
}
