//! Billing events
//!
//! Append-only billing event log for audit trails and debugging. Events
//! answer "why is this business on this plan?" and let us reconstruct the
//! reconciliation history for a tenant. Logging is best-effort: handlers warn
//! and continue when a write fails.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    AddonActivated,
    AddonCanceled,
    InvoicePaid,
    InvoiceFailed,
    LeadConverted,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::SubscriptionCreated => "SUBSCRIPTION_CREATED",
            BillingEventType::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            BillingEventType::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
            BillingEventType::AddonActivated => "ADDON_ACTIVATED",
            BillingEventType::AddonCanceled => "ADDON_CANCELED",
            BillingEventType::InvoicePaid => "INVOICE_PAID",
            BillingEventType::InvoiceFailed => "INVOICE_FAILED",
            BillingEventType::LeadConverted => "LEAD_CONVERTED",
        };
        write!(f, "{}", s)
    }
}

/// A billing event to record
#[derive(Debug, Clone)]
pub struct BillingEventRecord {
    pub business_id: Uuid,
    pub event_type: BillingEventType,
    pub data: serde_json::Value,
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

impl BillingEventRecord {
    pub fn new(business_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            business_id,
            event_type,
            data: serde_json::Value::Null,
            stripe_event_id: None,
            stripe_subscription_id: None,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn stripe_event(mut self, event_id: &str) -> Self {
        self.stripe_event_id = Some(event_id.to_string());
        self
    }

    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }
}

/// Writes billing events to the append-only log
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_event(&self, event: BillingEventRecord) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO billing_events
                (id, business_id, event_type, data, stripe_event_id, stripe_subscription_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(event.business_id)
        .bind(event.event_type.to_string())
        .bind(&event.data)
        .bind(event.stripe_event_id.as_deref())
        .bind(event.stripe_subscription_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}
