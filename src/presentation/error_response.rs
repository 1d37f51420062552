// Mapping of service errors onto HTTP responses
use crate::application::error::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let detail = match &self {
            Self::Unauthorized => "Invalid API key".to_string(),
            Self::Validation(message) => message.clone(),
            // Database errors stay in the logs
            Self::StoreUnavailable(_) => "Store unavailable".to_string(),
        };

        (self.status_code(), Json(json!({ "detail": detail }))).into_response()
    }
}
