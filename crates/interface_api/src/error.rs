//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_billing::{BillingError, ExportError};

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error_type, message) = match &self {
            ApiError::NotFound(msg) => ("not_found", msg.clone()),
            ApiError::BadRequest(msg) => ("bad_request", msg.clone()),
            ApiError::Unauthorized => ("unauthorized", "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => ("forbidden", msg.clone()),
            ApiError::Conflict(msg) => ("conflict", msg.clone()),
            ApiError::Internal(msg) => ("internal_error", msg.clone()),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone()),
            ApiError::Validation(msg) => ("validation_error", msg.clone()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else if err.is_duplicate() || matches!(err, PortError::Conflict { .. }) {
            ApiError::Conflict(err.to_string())
        } else if err.is_transient() {
            ApiError::ServiceUnavailable(err.to_string())
        } else if matches!(err, PortError::Validation { .. }) {
            ApiError::Validation(err.to_string())
        } else {
            error!(error = %err, "Adapter failure");
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Port(e) => e.into(),
            BillingError::BillNotFound(_) | BillingError::BusinessYearNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            BillingError::DuplicatePayment(_) => ApiError::Conflict(err.to_string()),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        error!(error = %err, "Booking export failed");
        ApiError::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(_) => ApiError::Forbidden(err.to_string()),
            AuthError::InvalidToken | AuthError::TokenExpired => ApiError::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::BillId;

    #[test]
    fn test_billing_error_status() {
        let cases = [
            (BillingError::BillNotFound(BillId::new(3)), StatusCode::NOT_FOUND),
            (BillingError::DuplicatePayment("ZV-1".to_string()), StatusCode::CONFLICT),
            (BillingError::NoOpenBill(4321), StatusCode::UNPROCESSABLE_ENTITY),
            (BillingError::NoBillableItems, StatusCode::UNPROCESSABLE_ENTITY),
            (
                BillingError::Port(PortError::duplicate("Payment", "ZV-1")),
                StatusCode::CONFLICT,
            ),
            (
                BillingError::Port(PortError::connection("refused")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                BillingError::Port(PortError::internal("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_auth_error_status() {
        let forbidden = ApiError::from(AuthError::MissingPermission("ledger:sync".to_string()));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::TokenExpired).status(), StatusCode::UNAUTHORIZED);
    }
}
