use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use berth_core::{CoreError, ErrorKind};

/// Seconds a caller should wait before retrying a busy inventory.
const RETRY_AFTER_SECONDS: &str = "1";

#[derive(Debug)]
pub struct AppError(pub CoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.0.to_body();
        let status = match body.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::CapacityExhausted => StatusCode::CONFLICT,
            ErrorKind::Conflict => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InvariantViolation | ErrorKind::Internal => {
                tracing::error!("Internal Server Error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut response = (status, Json(body)).into_response();
        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
        }
        response
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}
