//! API error type and HTTP response mapping
//!
//! Response codes carry retry semantics for Stripe: 400 means "do not
//! redeliver" (forged or misconfigured request), 500 means "redeliver later".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use detailflow_billing::BillingError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook processing failed: {0}")]
    WebhookProcessing(String),
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        if e.is_client_error() {
            ApiError::InvalidSignature
        } else {
            ApiError::WebhookProcessing(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingSignature | ApiError::InvalidSignature => StatusCode::BAD_REQUEST,
            ApiError::WebhookProcessing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
