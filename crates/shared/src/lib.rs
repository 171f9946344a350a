#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Detailflow Shared Module
//!
//! Domain types shared between the billing core and the API server:
//! subscription plans, statuses, billing periods, region-aware signup
//! defaults, and database pool construction.

pub mod db;
pub mod regions;

use serde::{Deserialize, Serialize};

pub use db::{create_pool, run_migrations};
pub use regions::{region_defaults, Climate, RegionDefaults};

/// Subscription plan tiers for detailing businesses
///
/// Plan identity is assigned from our own checkout metadata at signup and
/// is never rewritten from Stripe's price catalog afterwards, so businesses
/// that purchased under a since-retired price keep the plan they bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Solo operator: single van, core booking + invoicing
    Starter,
    /// Growing shop: team scheduling, lead inbox, SMS reminders
    Pro,
    /// Multi-van operation: fleet dispatch, route planning, analytics
    Fleet,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Fleet => "fleet",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            "fleet" => Some(PlanTier::Fleet),
            _ => None,
        }
    }

    /// Included team seats before per-seat billing applies
    pub fn included_seats(&self) -> i32 {
        match self {
            PlanTier::Starter => 1,
            PlanTier::Pro => 3,
            PlanTier::Fleet => 10,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local subscription status for a business
///
/// Businesses are never hard-deleted; cancellation is a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Trialing,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Trialing => "trialing",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "trialing" => Some(SubscriptionStatus::Trialing),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing period for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    #[default]
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            // "annual" appears in older checkout sessions
            "monthly" => Some(BillingPeriod::Monthly),
            "yearly" | "annual" => Some(BillingPeriod::Yearly),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_round_trip() {
        for tier in [PlanTier::Starter, PlanTier::Pro, PlanTier::Fleet] {
            assert_eq!(PlanTier::from_str(tier.as_str()), Some(tier));
        }
        assert_eq!(PlanTier::from_str("enterprise"), None);
    }

    #[test]
    fn test_billing_period_accepts_legacy_annual() {
        assert_eq!(BillingPeriod::from_str("annual"), Some(BillingPeriod::Yearly));
        assert_eq!(BillingPeriod::from_str("yearly"), Some(BillingPeriod::Yearly));
        assert_eq!(BillingPeriod::from_str("weekly"), None);
    }

    #[test]
    fn test_subscription_status_round_trip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Trialing,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_included_seats_increase_with_tier() {
        assert!(PlanTier::Starter.included_seats() < PlanTier::Pro.included_seats());
        assert!(PlanTier::Pro.included_seats() < PlanTier::Fleet.included_seats());
    }
}
