//! Maps core errors onto wire-level failure responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use relay_core::BrowserError;

pub struct ApiError(pub BrowserError);

impl From<BrowserError> for ApiError {
    fn from(err: BrowserError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrowserError::SessionNotFound(_) | BrowserError::ElementNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BrowserError::PoolExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            BrowserError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            BrowserError::InvalidUrl(_) | BrowserError::InvalidPattern(_) => {
                StatusCode::BAD_REQUEST
            }
            BrowserError::Uninitialized | BrowserError::Capability(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
