//! HTTP routes

pub mod webhooks;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
