// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Detailflow Billing Module
//!
//! Handles Stripe integration for the detailing-business SaaS: keeping local
//! tenant and add-on state consistent with Stripe's reported subscription
//! state as webhook events arrive.
//!
//! ## Features
//!
//! - **Webhook verification**: signature check with manual HMAC fallback
//! - **Idempotency ledger**: each Stripe event is claimed exactly once
//! - **Tenant reconciliation**: create on first checkout, billing-field
//!   updates on renewal, status transition on cancellation
//! - **Add-on reconciliation**: item-diff against the primary subscription,
//!   standalone add-on subscriptions, invoice-driven degrade/restore
//! - **Audit log**: append-only billing events

pub mod addons;
pub mod client;
pub mod error;
pub mod events;
pub mod metadata;
pub mod tenants;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Add-ons
pub use addons::{
    addon_status_for_parent, plan_addon_transitions, AddonKey, AddonService, AddonStatus,
    SubscriptionAddon,
};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEventLogger, BillingEventRecord, BillingEventType};

// Metadata
pub use metadata::{AddonCheckout, CheckoutKind, PrimaryCheckout, SignupData};

// Tenants
pub use tenants::{map_subscription_status, TenantService};

// Webhooks
pub use webhooks::{verify_signature, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub addons: AddonService,
    pub tenants: TenantService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    ///
    /// Fails at startup when Stripe configuration is missing; handlers never
    /// re-check configuration per request.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new_with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::new_with_client(StripeClient::new(config), pool)
    }

    fn new_with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            addons: AddonService::new(pool.clone()),
            tenants: TenantService::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
