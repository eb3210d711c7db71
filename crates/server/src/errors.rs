use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use storage::StorageError;
use tracing::error;

/// HTTP mapping of storage failures: caller mistakes answer 400, backend
/// failures answer 500 with the error logged.
#[derive(Debug)]
pub struct ApiError(pub StorageError);

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let msg = self.0.to_string();
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %msg, "storage error");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(serde_json::json!({"error": msg}))).into_response()
    }
}
