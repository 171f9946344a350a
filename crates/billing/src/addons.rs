//! Subscription add-ons management
//!
//! Add-ons are optional paid capabilities attached to a business's primary
//! subscription, billed either as a line item on that subscription or as a
//! standalone Stripe subscription. The `(business_id, addon_key)` pair is the
//! logical identity; the Stripe subscription-item id is the binding key used
//! to detect removal. Records are never hard-deleted, only status-transitioned.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use detailflow_shared::SubscriptionStatus;

use crate::error::{BillingError, BillingResult};

/// Supported add-on keys
///
/// Older checkout sessions carried hyphenated keys (`photo-analysis`); both
/// shapes normalize to the canonical snake_case key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonKey {
    /// AI photo analysis: auto-grade vehicle condition from customer photos ($15/mo)
    PhotoAnalysis,
    /// Mileage tracker: per-van route mileage and fuel reports ($8/mo)
    MileageTracker,
    /// Auto-lead: automatic lead capture from missed calls and web forms ($12/mo)
    AutoLead,
}

impl AddonKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonKey::PhotoAnalysis => "photo_analysis",
            AddonKey::MileageTracker => "mileage_tracker",
            AddonKey::AutoLead => "auto_lead",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "photo_analysis" | "photo-analysis" => Some(AddonKey::PhotoAnalysis),
            "mileage_tracker" | "mileage-tracker" => Some(AddonKey::MileageTracker),
            "auto_lead" | "auto-lead" => Some(AddonKey::AutoLead),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AddonKey::PhotoAnalysis => "AI Photo Analysis",
            AddonKey::MileageTracker => "Mileage Tracker",
            AddonKey::AutoLead => "Auto-Lead Capture",
        }
    }

    pub fn price_cents(&self) -> i32 {
        match self {
            AddonKey::PhotoAnalysis => 1500,
            AddonKey::MileageTracker => 800,
            AddonKey::AutoLead => 1200,
        }
    }
}

impl std::fmt::Display for AddonKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an add-on attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonStatus {
    Active,
    PastDue,
    Canceled,
    Trial,
}

impl AddonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonStatus::Active => "active",
            AddonStatus::PastDue => "past_due",
            AddonStatus::Canceled => "canceled",
            AddonStatus::Trial => "trial",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AddonStatus::Active),
            "past_due" => Some(AddonStatus::PastDue),
            "canceled" => Some(AddonStatus::Canceled),
            "trial" => Some(AddonStatus::Trial),
            _ => None,
        }
    }
}

impl std::fmt::Display for AddonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An add-on record attached to a business
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionAddon {
    pub id: Uuid,
    pub business_id: Uuid,
    pub addon_key: AddonKey,
    /// Stripe subscription-item id binding this record to the provider's
    /// line item; None for records created before item binding existed
    pub stripe_item_id: Option<String>,
    pub status: AddonStatus,
    pub canceled_at: Option<OffsetDateTime>,
}

/// Add-on status implied by a parent subscription's status
pub fn addon_status_for_parent(parent: SubscriptionStatus) -> AddonStatus {
    match parent {
        SubscriptionStatus::Active => AddonStatus::Active,
        SubscriptionStatus::PastDue => AddonStatus::PastDue,
        SubscriptionStatus::Canceled => AddonStatus::Canceled,
        SubscriptionStatus::Trialing => AddonStatus::Trial,
    }
}

/// Compute status transitions for a business's add-ons after the primary
/// subscription changed
///
/// Diffs each add-on's bound item id against the subscription's current item
/// list: a bound item that disappeared means the add-on was removed and is
/// canceled. Surviving add-ons track the parent status — an `active` parent
/// promotes anything not already active, a `past_due` parent demotes.
/// Already-canceled add-ons are never resurrected here.
pub fn plan_addon_transitions(
    parent_status: SubscriptionStatus,
    addons: &[SubscriptionAddon],
    current_item_ids: &[String],
) -> Vec<(Uuid, AddonStatus)> {
    let mut transitions = Vec::new();

    for addon in addons {
        if addon.status == AddonStatus::Canceled {
            continue;
        }

        let item_removed = match &addon.stripe_item_id {
            Some(item_id) => !current_item_ids.iter().any(|id| id == item_id),
            // Unbound add-ons (standalone subscriptions) are not part of the
            // primary subscription's item list and are left alone
            None => false,
        };

        if item_removed {
            transitions.push((addon.id, AddonStatus::Canceled));
            continue;
        }

        match parent_status {
            SubscriptionStatus::Active if addon.status != AddonStatus::Active => {
                transitions.push((addon.id, AddonStatus::Active));
            }
            SubscriptionStatus::PastDue if addon.status != AddonStatus::PastDue => {
                transitions.push((addon.id, AddonStatus::PastDue));
            }
            _ => {}
        }
    }

    transitions
}

/// Service owning reads and writes to the add-on tables
///
/// The webhook reconcilers depend on this contract rather than writing to
/// `subscription_addons` directly.
#[derive(Clone)]
pub struct AddonService {
    pool: PgPool,
}

impl AddonService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert an add-on attachment after a completed add-on checkout
    ///
    /// Keyed on `(business_id, addon_key)` so a redelivered checkout event
    /// converges instead of duplicating rows. Re-purchasing a canceled
    /// add-on reactivates the existing record and rebinds the item id.
    pub async fn create_subscription_addon(
        &self,
        business_id: Uuid,
        addon_key: AddonKey,
        stripe_item_id: Option<&str>,
    ) -> BillingResult<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO subscription_addons (id, business_id, addon_key, stripe_item_id, status)
            VALUES ($1, $2, $3, $4, 'active')
            ON CONFLICT (business_id, addon_key) DO UPDATE SET
                stripe_item_id = EXCLUDED.stripe_item_id,
                status = 'active',
                canceled_at = NULL,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(addon_key.as_str())
        .bind(stripe_item_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            business_id = %business_id,
            addon_key = %addon_key,
            stripe_item_id = ?stripe_item_id,
            "Add-on attached"
        );

        Ok(id)
    }

    pub async fn update_subscription_addon_status(
        &self,
        addon_id: Uuid,
        status: AddonStatus,
    ) -> BillingResult<()> {
        let canceled_at = if status == AddonStatus::Canceled {
            Some(OffsetDateTime::now_utc())
        } else {
            None
        };

        sqlx::query(
            r#"
            UPDATE subscription_addons
            SET status = $1, canceled_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(canceled_at)
        .bind(addon_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stored status of one add-on by its logical identity, if a record exists
    pub async fn get_addon_status(
        &self,
        business_id: Uuid,
        addon_key: AddonKey,
    ) -> BillingResult<Option<AddonStatus>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status
            FROM subscription_addons
            WHERE business_id = $1 AND addon_key = $2
            "#,
        )
        .bind(business_id)
        .bind(addon_key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((status,)) => AddonStatus::from_str(&status)
                .map(Some)
                .ok_or_else(|| BillingError::Internal(format!("Bad addon status: {}", status))),
            None => Ok(None),
        }
    }

    /// All add-on records for a business, canceled included
    pub async fn get_business_subscription_addons(
        &self,
        business_id: Uuid,
    ) -> BillingResult<Vec<SubscriptionAddon>> {
        let rows: Vec<(Uuid, Uuid, String, Option<String>, String, Option<OffsetDateTime>)> =
            sqlx::query_as(
                r#"
                SELECT id, business_id, addon_key, stripe_item_id, status, canceled_at
                FROM subscription_addons
                WHERE business_id = $1
                ORDER BY created_at
                "#,
            )
            .bind(business_id)
            .fetch_all(&self.pool)
            .await?;

        let mut addons = Vec::with_capacity(rows.len());
        for (id, business_id, key, stripe_item_id, status, canceled_at) in rows {
            let addon_key = AddonKey::from_str(&key)
                .ok_or_else(|| BillingError::UnknownAddon(key.clone()))?;
            let status = AddonStatus::from_str(&status)
                .ok_or_else(|| BillingError::Internal(format!("Bad addon status: {}", status)))?;
            addons.push(SubscriptionAddon {
                id,
                business_id,
                addon_key,
                stripe_item_id,
                status,
                canceled_at,
            });
        }

        Ok(addons)
    }

    /// Cancel every add-on attached to a business (primary subscription deleted)
    pub async fn cancel_all_for_business(&self, business_id: Uuid) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_addons
            SET status = 'canceled', canceled_at = NOW(), updated_at = NOW()
            WHERE business_id = $1 AND status != 'canceled'
            "#,
        )
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Promote past-due add-ons back to active after a successful charge
    pub async fn restore_past_due(&self, business_id: Uuid) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_addons
            SET status = 'active', updated_at = NOW()
            WHERE business_id = $1 AND status = 'past_due'
            "#,
        )
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Demote active add-ons to past-due after a failed charge
    ///
    /// Degrades capability access without deleting state; the next
    /// successful invoice restores it.
    pub async fn degrade_active(&self, business_id: Uuid) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_addons
            SET status = 'past_due', updated_at = NOW()
            WHERE business_id = $1 AND status = 'active'
            "#,
        )
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Record the add-on in the business's feature projection table
    ///
    /// Best-effort denormalization for fast feature lookups; callers log and
    /// continue on failure.
    pub async fn grant_feature(&self, business_id: Uuid, addon_key: AddonKey) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO business_features (business_id, feature)
            VALUES ($1, $2)
            ON CONFLICT (business_id, feature) DO NOTHING
            "#,
        )
        .bind(business_id)
        .bind(addon_key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}


#[cfg(test)]
mod service_tests {
    use super::*;

    async fn seed_business(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO businesses (id, owner_id, name, state, plan)
            VALUES ($1, $2, 'Ace Detailing', 'CA', 'pro')
            "#,
        )
        .bind(id)
        .bind(Uuid::new_v4())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_canceled_status_survives_lookup_and_checkout_reactivates(pool: PgPool) {
        let service = AddonService::new(pool.clone());
        let business_id = seed_business(&pool).await;

        let addon_id = service
            .create_subscription_addon(business_id, AddonKey::PhotoAnalysis, Some("si_1"))
            .await
            .unwrap();
        service
            .update_subscription_addon_status(addon_id, AddonStatus::Canceled)
            .await
            .unwrap();

        assert_eq!(
            service
                .get_addon_status(business_id, AddonKey::PhotoAnalysis)
                .await
                .unwrap(),
            Some(AddonStatus::Canceled)
        );
        assert_eq!(
            service
                .get_addon_status(business_id, AddonKey::AutoLead)
                .await
                .unwrap(),
            None
        );

        // A new checkout reactivates the same record and rebinds the item
        let reactivated_id = service
            .create_subscription_addon(business_id, AddonKey::PhotoAnalysis, Some("si_2"))
            .await
            .unwrap();
        assert_eq!(reactivated_id, addon_id);

        let addons = service
            .get_business_subscription_addons(business_id)
            .await
            .unwrap();
        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].status, AddonStatus::Active);
        assert_eq!(addons[0].stripe_item_id.as_deref(), Some("si_2"));
        assert!(addons[0].canceled_at.is_none());
    }
}
