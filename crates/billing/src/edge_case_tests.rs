// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing Reconciliation
//!
//! Boundary conditions that the per-module tests don't cover:
//! - webhook signature header quirks
//! - checkout metadata precedence and partial shapes
//! - add-on transition interactions

mod signature_tests {
    use crate::error::BillingError;
    use crate::webhooks::verify_signature;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &str = "whsec_edge_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let key = SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_header_with_v0_scheme_is_tolerated() {
        // Stripe sends both v0 and v1; only v1 is checked
        let payload = "{}";
        let now = 1_700_000_000;
        let header = format!("t={},v1={},v0=deadbeef", now, sign(payload, now));
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_future_timestamp_within_tolerance_accepted() {
        // Clock skew between Stripe and us works both directions
        let payload = "{}";
        let now = 1_700_000_000;
        let future = now + 200;
        let header = format!("t={},v1={}", future, sign(payload, future));
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_empty_payload_still_verifies() {
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign("", now));
        assert!(verify_signature("", &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_signature_for_other_secret_rejected() {
        let payload = "{}";
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, now));
        let result = verify_signature(payload, &header, "whsec_other", now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }
}

mod metadata_tests {
    use crate::addons::AddonKey;
    use crate::error::BillingError;
    use crate::metadata::CheckoutKind;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn test_addon_metadata_wins_over_primary_fields() {
        // A session carrying both shapes is an add-on checkout; the primary
        // fields are leftovers and must not create a tenant
        let mut m = HashMap::new();
        m.insert("user_id".into(), Uuid::new_v4().to_string());
        m.insert("plan_id".into(), "pro".into());
        m.insert("billing_period".into(), "monthly".into());
        m.insert("signup_data".into(), r#"{"businessName":"X","state":"CA"}"#.into());
        m.insert("business_id".into(), Uuid::new_v4().to_string());
        m.insert("addon_key".into(), "auto_lead".into());

        match CheckoutKind::from_metadata(&m).unwrap() {
            CheckoutKind::Addon(a) => assert_eq!(a.addon, AddonKey::AutoLead),
            CheckoutKind::Primary(_) => panic!("addon metadata must take precedence"),
        }
    }

    #[test]
    fn test_addon_without_business_id_fails_closed() {
        let mut m = HashMap::new();
        m.insert("addon_key".into(), "photo_analysis".into());
        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_signup_data_missing_business_name_fails_closed() {
        let mut m = HashMap::new();
        m.insert("user_id".into(), Uuid::new_v4().to_string());
        m.insert("plan_id".into(), "starter".into());
        m.insert("billing_period".into(), "yearly".into());
        m.insert("signup_data".into(), r#"{"state":"CA"}"#.into());

        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_unknown_extra_metadata_keys_are_ignored() {
        let mut m = HashMap::new();
        m.insert("user_id".into(), Uuid::new_v4().to_string());
        m.insert("plan_id".into(), "fleet".into());
        m.insert("billing_period".into(), "monthly".into());
        m.insert("signup_data".into(), r#"{"businessName":"Shine Co","state":"TX"}"#.into());
        // Keys written by other checkout flows
        m.insert("utm_source".into(), "google".into());
        m.insert("price_id".into(), "price_retired_123".into());

        assert!(CheckoutKind::from_metadata(&m).is_ok());
    }

    #[test]
    fn test_malformed_lead_id_fails_closed() {
        let mut m = HashMap::new();
        m.insert("user_id".into(), Uuid::new_v4().to_string());
        m.insert("plan_id".into(), "pro".into());
        m.insert("billing_period".into(), "monthly".into());
        m.insert("signup_data".into(), r#"{"businessName":"X","state":"CA"}"#.into());
        m.insert("signup_lead_id".into(), "lead-42".into());

        assert!(matches!(
            CheckoutKind::from_metadata(&m),
            Err(BillingError::InvalidMetadata(_))
        ));
    }
}

mod transition_tests {
    use crate::addons::{plan_addon_transitions, AddonKey, AddonStatus, SubscriptionAddon};
    use detailflow_shared::SubscriptionStatus;
    use uuid::Uuid;

    fn addon(key: AddonKey, item: &str, status: AddonStatus) -> SubscriptionAddon {
        SubscriptionAddon {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            addon_key: key,
            stripe_item_id: Some(item.to_string()),
            status,
            canceled_at: None,
        }
    }

    #[test]
    fn test_removal_wins_over_demotion() {
        // A past-due parent whose item list dropped the add-on cancels it
        // rather than demoting it
        let a = addon(AddonKey::PhotoAnalysis, "si_gone", AddonStatus::Active);
        let transitions = plan_addon_transitions(SubscriptionStatus::PastDue, &[a.clone()], &[]);
        assert_eq!(transitions, vec![(a.id, AddonStatus::Canceled)]);
    }

    #[test]
    fn test_trialing_parent_leaves_statuses_alone() {
        let a = addon(AddonKey::MileageTracker, "si_x", AddonStatus::Active);
        let b = addon(AddonKey::AutoLead, "si_y", AddonStatus::PastDue);
        let transitions = plan_addon_transitions(
            SubscriptionStatus::Trialing,
            &[a, b],
            &["si_x".to_string(), "si_y".to_string()],
        );
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_mixed_batch_resolves_each_addon_independently() {
        let kept = addon(AddonKey::PhotoAnalysis, "si_kept", AddonStatus::PastDue);
        let removed = addon(AddonKey::MileageTracker, "si_removed", AddonStatus::Active);
        let canceled = addon(AddonKey::AutoLead, "si_old", AddonStatus::Canceled);

        let transitions = plan_addon_transitions(
            SubscriptionStatus::Active,
            &[kept.clone(), removed.clone(), canceled],
            &["si_kept".to_string()],
        );

        assert_eq!(transitions.len(), 2);
        assert!(transitions.contains(&(kept.id, AddonStatus::Active)));
        assert!(transitions.contains(&(removed.id, AddonStatus::Canceled)));
    }

    #[test]
    fn test_empty_addon_list_is_a_no_op() {
        let transitions =
            plan_addon_transitions(SubscriptionStatus::Active, &[], &["si_x".to_string()]);
        assert!(transitions.is_empty());
    }
}
