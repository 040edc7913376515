use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lookalike_core::LookalikeError;
use serde_json::json;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Error returned by handlers, rendered as `{"error": kind, "message": text}`.
#[derive(Debug)]
pub enum ApiError {
    Core(LookalikeError),
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(e) => match e {
                LookalikeError::InvalidImage(_) => StatusCode::BAD_REQUEST,
                LookalikeError::ConstraintViolation(_) => StatusCode::CONFLICT,
                LookalikeError::NotFound(_) => StatusCode::NOT_FOUND,
                LookalikeError::StoreUnavailable(_) | LookalikeError::ModelUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                LookalikeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                LookalikeError::Blob(_) | LookalikeError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Core(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Core(e) => e.to_string(),
            Self::BadRequest(msg) => msg.clone(),
        };

        if status.is_server_error() {
            tracing::error!("{} {}", status.as_u16(), message);
        } else {
            tracing::debug!("{} {}", status.as_u16(), message);
        }

        let body = Json(json!({ "error": self.kind(), "message": message }));
        (status, body).into_response()
    }
}

impl From<LookalikeError> for ApiError {
    fn from(err: LookalikeError) -> Self {
        Self::Core(err)
    }
}
