//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use detailflow_billing::BillingService;

use crate::config::Config;

/// Shared application state
///
/// The billing service is constructed once here; a missing Stripe secret
/// fails startup instead of surfacing as per-request errors.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let billing = BillingService::from_env(pool.clone())
            .map_err(|e| anyhow::anyhow!("Billing configuration error: {}", e))?;

        Ok(Self {
            pool,
            config,
            billing: Arc::new(billing),
        })
    }
}
