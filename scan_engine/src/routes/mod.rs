mod camera;
mod health;
mod history;
mod metrics;
mod model;
mod predictions;

use crate::{
    camera::CameraError, frame::FrameError, history::HistoryError, model::ModelError,
    server::SharedState,
};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;

/// `max_upload_bytes` bounds the image bodies of `/classify` and
/// `/camera/frame`.
pub fn api_routes(max_upload_bytes: usize) -> Router<SharedState> {
    let upload_limit = DefaultBodyLimit::max(max_upload_bytes);

    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/model", get(model::model_status))
        .route("/model/load", post(model::load_model))
        .route(
            "/predictions",
            get(predictions::current_predictions).delete(predictions::clear_predictions),
        )
        .route(
            "/classify",
            post(predictions::classify_image).layer(upload_limit),
        )
        .route("/camera/start", post(camera::start_camera))
        .route(
            "/camera/frame",
            post(camera::push_frame).layer(upload_limit),
        )
        .route("/camera/capture", post(camera::capture_frame))
        .route("/camera/stop", post(camera::stop_camera))
        .route("/scan/start", post(camera::start_scan))
        .route("/scan/stop", post(camera::stop_scan))
        .route(
            "/session",
            put(history::sign_in).delete(history::sign_out),
        )
        .route(
            "/history",
            get(history::list_history).post(history::save_result),
        )
        .route("/history/{id}", delete(history::delete_entry))
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Image error: {0}")]
    Frame(#[from] FrameError),
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("History error: {0}")]
    History(#[from] HistoryError),
    #[error("A classification is already in progress")]
    Busy,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Model(ModelError::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Model(ModelError::Load(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Model(ModelError::Inference(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Frame(_) | ApiError::Camera(CameraError::DecodeFrameFailed(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Camera(_) | ApiError::Busy => StatusCode::CONFLICT,
            ApiError::History(HistoryError::NoPredictions) => StatusCode::CONFLICT,
            ApiError::History(HistoryError::NotAuthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::History(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::Model(ModelError::NotReady).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Busy.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::History(HistoryError::NotAuthenticated).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Frame(FrameError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
