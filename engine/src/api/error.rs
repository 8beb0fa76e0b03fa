use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sdk::{EngineError, EngineErrorExt};
use serde_json::json;

/// `EngineError` rendered as `{error, hint}` with a matching status
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::InvalidRequest(_) | EngineError::InvalidModel(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::UserNotFound(_) | EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::LLMProvider(_) | EngineError::Network(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures may carry store or provider detail; log it, don't return it
        let error = if status.is_server_error() {
            tracing::error!("Request failed: {}", crate::secrets::scrub(&self.0.to_string()));
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(json!({
                "error": error,
                "hint": self.0.user_hint(),
            })),
        )
            .into_response()
    }
}
