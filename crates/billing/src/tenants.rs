//! Tenant (business) reconciliation
//!
//! Maps Stripe's reported subscription state onto the local `businesses`
//! table. A business is created on its owner's first successful checkout and
//! only ever updated after that: renewal events touch billing fields,
//! cancellation is a status transition, and the signup-form fields written at
//! creation are never overwritten by later events.

use sqlx::PgPool;
use stripe::{Expandable, Subscription};
use time::OffsetDateTime;
use uuid::Uuid;

use detailflow_shared::{region_defaults, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::metadata::PrimaryCheckout;

/// Map Stripe's subscription status onto our local status set
///
/// Incomplete and unpaid states degrade to past_due rather than growing the
/// local status vocabulary.
pub fn map_subscription_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    match status {
        stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
        stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
        stripe::SubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
        stripe::SubscriptionStatus::Canceled => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::PastDue,
    }
}

fn customer_id_of(subscription: &Subscription) -> String {
    match &subscription.customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    }
}

fn period_end_of(subscription: &Subscription) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(subscription.current_period_end)
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Service owning reads and writes to the `businesses` table
#[derive(Clone)]
pub struct TenantService {
    pool: PgPool,
}

impl TenantService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a completed primary-subscription checkout
    ///
    /// Upserts by owner id: the first checkout for an owner creates the
    /// business with its signup fields and region-derived starting
    /// configuration; a repeat checkout (plan change, redelivered event)
    /// updates billing fields only. The plan comes from our own checkout
    /// metadata, never from the Stripe price id.
    pub async fn apply_primary_checkout(
        &self,
        checkout: &PrimaryCheckout,
        subscription: &Subscription,
    ) -> BillingResult<Uuid> {
        let status = map_subscription_status(subscription.status);
        let customer_id = customer_id_of(subscription);
        let period_end = period_end_of(subscription);
        let defaults = region_defaults(&checkout.signup.state);
        let starting_conditions: Vec<String> = defaults
            .starting_conditions
            .iter()
            .map(|c| c.to_string())
            .collect();

        let (business_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO businesses (
                id, owner_id, name, address, city, state, zip, phone,
                plan, subscription_status, billing_period, team_size,
                stripe_subscription_id, stripe_customer_id, current_period_end,
                timezone, starting_conditions
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            ON CONFLICT (owner_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                subscription_status = EXCLUDED.subscription_status,
                billing_period = EXCLUDED.billing_period,
                team_size = EXCLUDED.team_size,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(checkout.owner_id)
        .bind(&checkout.signup.business_name)
        .bind(checkout.signup.address.as_deref())
        .bind(checkout.signup.city.as_deref())
        .bind(&checkout.signup.state)
        .bind(checkout.signup.zip.as_deref())
        .bind(checkout.signup.phone.as_deref())
        .bind(checkout.plan.as_str())
        .bind(status.as_str())
        .bind(checkout.billing_period.as_str())
        .bind(checkout.team_size)
        .bind(subscription.id.as_str())
        .bind(&customer_id)
        .bind(period_end)
        .bind(defaults.timezone)
        .bind(&starting_conditions)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            business_id = %business_id,
            owner_id = %checkout.owner_id,
            plan = %checkout.plan,
            subscription_id = %subscription.id,
            "Primary checkout applied"
        );

        Ok(business_id)
    }

    /// Update billing state from a subscription-updated event
    ///
    /// Matches on the stored subscription id and touches only status and
    /// renewal timestamp; the plan is deliberately left alone. A business
    /// already canceled locally is not resurrected by a late-arriving
    /// update event.
    pub async fn apply_subscription_updated(
        &self,
        subscription: &Subscription,
    ) -> BillingResult<Uuid> {
        let sub_id = subscription.id.as_str();
        let (business_id, current) = self
            .find_by_subscription(sub_id)
            .await?
            .ok_or_else(|| BillingError::BusinessNotFound(sub_id.to_string()))?;

        if current == SubscriptionStatus::Canceled {
            tracing::info!(
                business_id = %business_id,
                subscription_id = %sub_id,
                "Ignoring update for locally-canceled subscription"
            );
            return Ok(business_id);
        }

        let status = map_subscription_status(subscription.status);
        let period_end = period_end_of(subscription);

        sqlx::query(
            r#"
            UPDATE businesses
            SET subscription_status = $1, current_period_end = $2, updated_at = NOW()
            WHERE stripe_subscription_id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(period_end)
        .bind(sub_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            business_id = %business_id,
            subscription_id = %sub_id,
            status = %status,
            "Subscription updated"
        );

        Ok(business_id)
    }

    /// Mark the business canceled from a subscription-deleted event
    pub async fn apply_subscription_deleted(&self, sub_id: &str) -> BillingResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE businesses
            SET subscription_status = 'canceled', updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING id
            "#,
        )
        .bind(sub_id)
        .fetch_optional(&self.pool)
        .await?;

        let (business_id,) =
            row.ok_or_else(|| BillingError::BusinessNotFound(sub_id.to_string()))?;

        tracing::info!(
            business_id = %business_id,
            subscription_id = %sub_id,
            "Subscription canceled"
        );

        Ok(business_id)
    }

    /// Look up a business by its stored Stripe subscription id
    pub async fn find_by_subscription(
        &self,
        sub_id: &str,
    ) -> BillingResult<Option<(Uuid, SubscriptionStatus)>> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, subscription_status FROM businesses WHERE stripe_subscription_id = $1",
        )
        .bind(sub_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, status)) => {
                let status = SubscriptionStatus::from_str(&status).ok_or_else(|| {
                    BillingError::Internal(format!("Bad subscription status: {}", status))
                })?;
                Ok(Some((id, status)))
            }
            None => Ok(None),
        }
    }

    /// Mark a signup lead converted after its checkout completed
    ///
    /// Funnel bookkeeping only; callers treat failure as non-fatal.
    pub async fn mark_lead_converted(&self, lead_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE signup_leads
            SET status = 'converted', converted_at = NOW()
            WHERE id = $1 AND status != 'converted'
            "#,
        )
        .bind(lead_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_core_states() {
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::Active),
            SubscriptionStatus::Active
        );
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::Trialing),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::PastDue),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::Canceled),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn test_incomplete_states_degrade_to_past_due() {
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::Incomplete),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            map_subscription_status(stripe::SubscriptionStatus::Unpaid),
            SubscriptionStatus::PastDue
        );
    }
}
