//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use gateway::GatewayError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout flow error.
    Checkout(CheckoutError),
    /// Repository error outside the checkout flow.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Authorization { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        CheckoutError::NotPayable { .. } | CheckoutError::Conflict { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CheckoutError::Gateway(gateway_err) => match gateway_err {
            GatewayError::Declined(_) => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            GatewayError::Unavailable(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
            GatewayError::UnknownReference(_) => (StatusCode::NOT_FOUND, err.to_string()),
            GatewayError::UnknownProvider(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        },
        CheckoutError::Store(store_err) => store_error_status(store_err, &err),
        CheckoutError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    let (status, _) = store_error_status(&err, &err);
    (status, err.to_string())
}

fn store_error_status(err: &StoreError, display: &impl std::fmt::Display) -> (StatusCode, String) {
    match err {
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, display.to_string()),
        StoreError::ConflictingTransaction { .. }
        | StoreError::Domain(DomainError::InvalidTransition { .. })
        | StoreError::Domain(DomainError::NotPayable { .. }) => {
            (StatusCode::CONFLICT, display.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, display.to_string()),
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
