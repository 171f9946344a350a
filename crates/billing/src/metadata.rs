//! Checkout metadata decoding
//!
//! Checkout sessions carry the tenant-to-be in string metadata we wrote when
//! creating the session. Decoding is schema-validated and fails closed: a
//! session with missing or malformed fields is rejected rather than producing
//! a partially-populated business record.
//!
//! Plan identity is taken only from this metadata, never from the Stripe
//! price id, so a business that purchased under a retired price keeps its
//! originally granted plan.

use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use detailflow_shared::{BillingPeriod, PlanTier};

use crate::addons::AddonKey;
use crate::error::{BillingError, BillingResult};

/// Signup form data serialized into the `signup_data` metadata field
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    pub business_name: String,
    pub state: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A decoded primary-subscription checkout
#[derive(Debug, Clone)]
pub struct PrimaryCheckout {
    pub owner_id: Uuid,
    pub plan: PlanTier,
    pub billing_period: BillingPeriod,
    pub team_size: i32,
    pub signup: SignupData,
    pub signup_lead_id: Option<Uuid>,
}

/// A decoded add-on checkout
#[derive(Debug, Clone)]
pub struct AddonCheckout {
    pub business_id: Uuid,
    pub addon: AddonKey,
}

/// What a completed checkout session was for
#[derive(Debug, Clone)]
pub enum CheckoutKind {
    Primary(PrimaryCheckout),
    Addon(AddonCheckout),
}

fn require<'a>(
    metadata: &'a HashMap<String, String>,
    key: &'static str,
) -> BillingResult<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| BillingError::InvalidMetadata(format!("missing {}", key)))
}

fn parse_uuid(value: &str, key: &'static str) -> BillingResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| BillingError::InvalidMetadata(format!("{} is not a UUID: {}", key, value)))
}

/// Resolve the add-on key from either metadata shape
///
/// Newer sessions write `addon_key`; sessions created by the first add-on
/// launch wrote `addon` with a hyphenated value. Both normalize to one key.
pub fn addon_key_from_metadata(
    metadata: &HashMap<String, String>,
) -> BillingResult<Option<AddonKey>> {
    let raw = match metadata.get("addon_key").or_else(|| metadata.get("addon")) {
        Some(raw) => raw,
        None => return Ok(None),
    };

    AddonKey::from_str(raw)
        .map(Some)
        .ok_or_else(|| BillingError::UnknownAddon(raw.clone()))
}

impl CheckoutKind {
    /// Decode a checkout session's metadata map
    ///
    /// Add-on metadata takes precedence: a session naming an add-on is an
    /// add-on checkout regardless of what else it carries.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> BillingResult<Self> {
        if let Some(addon) = addon_key_from_metadata(metadata)? {
            let business_id = parse_uuid(require(metadata, "business_id")?, "business_id")?;
            return Ok(CheckoutKind::Addon(AddonCheckout { business_id, addon }));
        }

        let owner_id = parse_uuid(require(metadata, "user_id")?, "user_id")?;

        let plan_raw = require(metadata, "plan_id")?;
        let plan = PlanTier::from_str(plan_raw)
            .ok_or_else(|| BillingError::InvalidMetadata(format!("unknown plan: {}", plan_raw)))?;

        let period_raw = require(metadata, "billing_period")?;
        let billing_period = BillingPeriod::from_str(period_raw).ok_or_else(|| {
            BillingError::InvalidMetadata(format!("unknown billing period: {}", period_raw))
        })?;

        let team_size = match metadata.get("team_size") {
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                BillingError::InvalidMetadata(format!("team_size is not a number: {}", raw))
            })?,
            None => plan.included_seats(),
        };

        let signup_raw = require(metadata, "signup_data")?;
        let signup: SignupData = serde_json::from_str(signup_raw)
            .map_err(|e| BillingError::InvalidMetadata(format!("bad signup_data: {}", e)))?;

        let signup_lead_id = metadata
            .get("signup_lead_id")
            .map(|raw| parse_uuid(raw, "signup_lead_id"))
            .transpose()?;

        Ok(CheckoutKind::Primary(PrimaryCheckout {
            owner_id,
            plan,
            billing_period,
            team_size,
            signup,
            signup_lead_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary_metadata() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("user_id".into(), "a51f8c1e-9a3b-4f2d-8e1a-0f3b2c4d5e6f".into());
        m.insert("plan_id".into(), "pro".into());
        m.insert("billing_period".into(), "monthly".into());
        m.insert("team_size".into(), "2".into());
        m.insert(
            "signup_data".into(),
            r#"{"businessName":"Ace Detailing","state":"CA"}"#.into(),
        );
        m
    }

    #[test]
    fn test_decodes_primary_checkout() {
        let kind = CheckoutKind::from_metadata(&primary_metadata()).unwrap();
        match kind {
            CheckoutKind::Primary(p) => {
                assert_eq!(p.plan, PlanTier::Pro);
                assert_eq!(p.billing_period, BillingPeriod::Monthly);
                assert_eq!(p.team_size, 2);
                assert_eq!(p.signup.business_name, "Ace Detailing");
                assert_eq!(p.signup.state, "CA");
                assert!(p.signup_lead_id.is_none());
            }
            CheckoutKind::Addon(_) => panic!("expected primary checkout"),
        }
    }

    #[test]
    fn test_missing_plan_fails_closed() {
        let mut m = primary_metadata();
        m.remove("plan_id");
        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_unknown_plan_fails_closed() {
        let mut m = primary_metadata();
        m.insert("plan_id".into(), "platinum".into());
        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_malformed_signup_json_fails_closed() {
        let mut m = primary_metadata();
        m.insert("signup_data".into(), "{not json".into());
        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_missing_team_size_defaults_to_plan_seats() {
        let mut m = primary_metadata();
        m.remove("team_size");
        match CheckoutKind::from_metadata(&m).unwrap() {
            CheckoutKind::Primary(p) => assert_eq!(p.team_size, PlanTier::Pro.included_seats()),
            CheckoutKind::Addon(_) => panic!("expected primary checkout"),
        }
    }

    #[test]
    fn test_signup_lead_id_parses_when_present() {
        let mut m = primary_metadata();
        let lead = Uuid::new_v4();
        m.insert("signup_lead_id".into(), lead.to_string());
        match CheckoutKind::from_metadata(&m).unwrap() {
            CheckoutKind::Primary(p) => assert_eq!(p.signup_lead_id, Some(lead)),
            CheckoutKind::Addon(_) => panic!("expected primary checkout"),
        }
    }

    #[test]
    fn test_addon_metadata_new_shape() {
        let mut m = HashMap::new();
        let business = Uuid::new_v4();
        m.insert("business_id".into(), business.to_string());
        m.insert("addon_key".into(), "mileage_tracker".into());

        match CheckoutKind::from_metadata(&m).unwrap() {
            CheckoutKind::Addon(a) => {
                assert_eq!(a.business_id, business);
                assert_eq!(a.addon, AddonKey::MileageTracker);
            }
            CheckoutKind::Primary(_) => panic!("expected addon checkout"),
        }
    }

    #[test]
    fn test_addon_metadata_legacy_shape() {
        let mut m = HashMap::new();
        m.insert("business_id".into(), Uuid::new_v4().to_string());
        m.insert("addon".into(), "photo-analysis".into());

        match CheckoutKind::from_metadata(&m).unwrap() {
            CheckoutKind::Addon(a) => assert_eq!(a.addon, AddonKey::PhotoAnalysis),
            CheckoutKind::Primary(_) => panic!("expected addon checkout"),
        }
    }

    #[test]
    fn test_unknown_addon_key_is_rejected() {
        let mut m = HashMap::new();
        m.insert("business_id".into(), Uuid::new_v4().to_string());
        m.insert("addon_key".into(), "ceramic_coating".into());
        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::UnknownAddon(_))
        ));
    }
}
