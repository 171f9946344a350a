//! Billing error taxonomy
//!
//! Errors map to webhook response semantics:
//! - configuration errors mean the operator must intervene (500, not fixable
//!   by a retried payload)
//! - signature errors return 400 so Stripe does not retry a forged or
//!   misconfigured request
//! - everything else returns 500 and relies on Stripe's redelivery

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook event not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("Invalid checkout metadata: {0}")]
    InvalidMetadata(String),

    #[error("Business not found for subscription {0}")]
    BusinessNotFound(String),

    #[error("Unknown add-on key: {0}")]
    UnknownAddon(String),

    #[error("Stripe API error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl BillingError {
    /// Whether Stripe should be told not to retry (client error)
    pub fn is_client_error(&self) -> bool {
        matches!(self, BillingError::WebhookSignatureInvalid)
    }
}
