use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Authentication failure (missing, malformed, or unknown token)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated but not permitted
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// A query or filter parameter failed validation
    #[error("Invalid {param}: {message}")]
    InvalidFilter { param: &'static str, message: String },
    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_filter(param: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            param,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidFilter { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Unauthorized(_) => "unauthorized",
        AppError::Forbidden(_) => "forbidden",
        AppError::NotFound(_) => "not_found",
        AppError::InvalidFilter { .. } => "invalid_filter",
        AppError::Internal(_) => "internal_error",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Clients get an opaque message; the cause chain goes to diagnostics.
        tracing::error!(error = ?err, "Request failed");
        Self::Internal(err.to_string())
    }
}
