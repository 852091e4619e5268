//! HTTP error mapping.
//!
//! Client mistakes surface with their message; infrastructure failures log
//! the detail and return a generic 500 so transport internals never leak to
//! callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use strata_protocol::CoreError;

pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::InvalidInput(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            CoreError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
            other => {
                error!("request failed: {}", other.job_message());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        if status == StatusCode::BAD_REQUEST {
            warn!("rejected request: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
