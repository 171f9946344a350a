//! Stripe client and configuration
//!
//! The client is constructed once at startup and injected into the services
//! that need it. A missing secret fails construction, not individual
//! requests.

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};

/// Stripe configuration loaded at startup
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... / sk_test_...)
    pub secret_key: String,
    /// Webhook endpoint signing secret (whsec_...)
    pub webhook_secret: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::MissingConfig("STRIPE_SECRET_KEY"))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::MissingConfig("STRIPE_WEBHOOK_SECRET"))?;

        if secret_key.is_empty() {
            return Err(BillingError::MissingConfig("STRIPE_SECRET_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(BillingError::MissingConfig("STRIPE_WEBHOOK_SECRET"));
        }

        Ok(Self {
            secret_key,
            webhook_secret,
        })
    }
}

/// Wrapper around the async-stripe client carrying our configuration
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// Access the underlying async-stripe client
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
