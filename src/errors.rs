use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use utoipa::ToSchema;

use crate::payment_gateway::GatewayError;
use crate::rate_limiter::{RateLimitError, RateLimitResult};
use crate::repositories::RepositoryError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Standard error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Validation failed",
    "details": [{"field": "items[0].quantity", "message": "Quantity must be between 1 and 99"}],
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    #[schema(example = "Validation failed")]
    pub message: String,
    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    #[schema(example = "2024-12-09T10:30:00.000Z")]
    pub timestamp: String,
}

/// A single rejected input field, addressed by path (`items[2].quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product out of stock: {0}")]
    OutOfStock(String),

    #[error("Price mismatch: server total {expected}, claimed {claimed}")]
    PriceMismatch { expected: i64, claimed: i64 },

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, retry_after_secs: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),
}

impl ServiceError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::ValidationFailed(vec![FieldError::new(field, message)])
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationFailed(_)
            | Self::ProductNotFound(_)
            | Self::OutOfStock(_)
            | Self::PriceMismatch { .. }
            | Self::InvalidPayload(_)
            | Self::SignatureInvalid => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::GatewayError(_) | Self::PersistenceFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Gateway and persistence failures return generic messages.
    pub fn response_message(&self) -> String {
        match self {
            Self::ProductNotFound(id) => {
                format!("Cart contains invalid or unavailable products: {} not found", id)
            }
            Self::OutOfStock(id) => {
                format!("Cart contains invalid or unavailable products: {} is out of stock", id)
            }
            Self::PriceMismatch { .. } => {
                "Price mismatch: cart total does not match current prices".to_string()
            }
            Self::InvalidPayload(_) => "Invalid webhook payload".to_string(),
            Self::GatewayError(_) => "Payment link creation failed".to_string(),
            Self::PersistenceFailed(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ValidationFailed(errors) => serde_json::to_value(errors).ok(),
            Self::PriceMismatch { expected, claimed } => {
                Some(json!({ "serverTotal": expected, "claimedTotal": claimed }))
            }
            _ => None,
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        ServiceError::PersistenceFailed(err.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::GatewayError(err.to_string())
    }
}

impl From<RateLimitError> for ServiceError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded { limit, retry_after } => ServiceError::RateLimited {
                limit,
                retry_after_secs: retry_after.as_secs().max(1),
            },
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(err)).into_response();
        if let Self::RateLimited {
            limit,
            retry_after_secs,
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            RateLimitResult {
                allowed: false,
                limit,
                remaining: 0,
                reset_time: Duration::from_secs(retry_after_secs),
            }
            .apply_headers(response.headers_mut());
        }
        response
    }
}
