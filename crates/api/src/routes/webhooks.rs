//! Stripe webhook endpoint
//!
//! Server-to-server only; the raw body must reach verification untouched, so
//! the handler takes the body as a `String` rather than a JSON extractor.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::error::ApiError;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /api/webhooks/stripe`
///
/// 200 `{"received": true}` on success or intentional ignore, 400 for a
/// missing or invalid signature (Stripe will not retry), 500 on handler
/// failure (Stripe retries later, which is our only recovery mechanism).
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingSignature)?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            ApiError::from(e)
        })?;

    state
        .billing
        .webhooks
        .handle_event(event)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook event processing failed");
            ApiError::from(e)
        })?;

    Ok(Json(serde_json::json!({ "received": true })))
}
