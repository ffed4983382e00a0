use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// JSON error body returned by every failing endpoint.
///
/// `code` is a stable machine-readable token clients can branch on;
/// `message` names the offending entity (which product is out of stock and
/// how many remain) so the UI can offer corrective action without parsing
/// free text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Stable machine-readable error code (e.g. "insufficient_stock")
    pub code: String,
    /// Human-readable description naming the offending entity
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Business-logic error taxonomy for the cart and checkout services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock for {name}: only {remaining} available")]
    InsufficientStock { name: String, remaining: i32 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid product reference: {0}")]
    InvalidProductReference(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InsufficientStock { .. }
            | Self::EmptyCart
            | Self::InvalidTransition(_)
            | Self::InvalidProductReference(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code surfaced in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::EmptyCart => "empty_cart",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidProductReference(_) => "invalid_product_reference",
            Self::Unauthorized(_) => "unauthorized",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Message suitable for HTTP responses. Internal failures return a
    /// generic message instead of leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Handler-level error wrapper so extractor and validation failures share
/// the same response shape as service failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Service(err) => err.into_response(),
            ApiError::Validation(message) => {
                let body = ErrorResponse {
                    error: "Bad Request".to_string(),
                    code: "validation_error".to_string(),
                    message,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::Unauthorized => {
                let body = ErrorResponse {
                    error: "Unauthorized".to_string(),
                    code: "unauthorized".to_string(),
                    message: "Authentication required".to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
        }
    }
}
