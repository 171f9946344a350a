//! Stripe webhook handling
//!
//! Verifies inbound events, claims them in an idempotency ledger, and routes
//! them to the tenant and add-on reconcilers. Stripe's redelivery on 500 is
//! the only retry mechanism, so every handler must be safe to re-run.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{
    CheckoutSessionMode, Event, EventObject, EventType, Expandable, Invoice, Subscription, Webhook,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::addons::{addon_status_for_parent, plan_addon_transitions, AddonService, AddonStatus};
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventRecord, BillingEventType};
use crate::metadata::{addon_key_from_metadata, AddonCheckout, CheckoutKind, PrimaryCheckout};
use crate::tenants::{map_subscription_status, TenantService};

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance in seconds
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Events stuck in `processing` longer than this can be re-claimed
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Verify a Stripe signature header against the raw payload
///
/// Header format: `t=<unix>,v1=<hex hmac>,...`. The signed payload is
/// `"{t}.{body}"` keyed with the webhook secret (minus its `whsec_` prefix).
/// `now_unix` is passed in so the tolerance window is testable.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in signature_header.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1]),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance window"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let expected =
        hex::decode(v1_signature).map_err(|_| BillingError::WebhookSignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());

    // verify_slice compares in constant time
    mac.verify_slice(&expected)
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;

    Ok(())
}

/// Whether a completed checkout session is one this system reconciles
///
/// Only subscription-mode sessions carrying metadata are ours. One-time
/// payment and setup sessions from other flows complete through the same
/// webhook and must be acknowledged untouched.
fn session_is_reconcilable(
    mode: CheckoutSessionMode,
    metadata: Option<&HashMap<String, String>>,
) -> bool {
    mode == CheckoutSessionMode::Subscription && metadata.is_some_and(|m| !m.is_empty())
}

/// Whether a subscription event may be applied over a stored standalone
/// add-on record
///
/// A locally canceled record is terminal for subscription events; only a new
/// checkout reactivates it.
fn standalone_event_applies(stored: Option<AddonStatus>) -> bool {
    !matches!(stored, Some(AddonStatus::Canceled))
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    tenants: TenantService,
    addons: AddonService,
    event_logger: BillingEventLogger,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let tenants = TenantService::new(pool.clone());
        let addons = AddonService::new(pool.clone());
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            stripe,
            pool,
            tenants,
            addons,
            event_logger,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Tries the async-stripe construction first; newer Stripe API versions
    /// ship fields that version rejects, so we fall back to verifying the
    /// signature manually and parsing the envelope ourselves.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature(payload, signature, webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// Claims exclusive processing rights in the event ledger before doing
    /// any work: an `INSERT .. ON CONFLICT .. RETURNING` either wins the row
    /// or tells us another delivery already has it. Rows left in `error`, or
    /// stuck in `processing` past the timeout, can be re-claimed so Stripe's
    /// retries actually make progress.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();
        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        if !Self::claim_event(&self.pool, &event_id, &event_type_str, event_timestamp).await? {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Duplicate webhook event, already processed or in flight"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event_type_str,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;
        Self::record_result(&self.pool, &event_id, &result).await;

        result
    }

    /// Atomically claim an event id in the ledger
    ///
    /// Returns false when another delivery already holds the row. Rows that
    /// finished in `error`, or sat in `processing` past the timeout, are
    /// claimable again so redelivery makes progress.
    async fn claim_event(
        pool: &PgPool,
        event_id: &str,
        event_type: &str,
        event_timestamp: OffsetDateTime,
    ) -> BillingResult<bool> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (id, stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, $4, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW()
            WHERE stripe_webhook_events.processing_result = 'error'
               OR (stripe_webhook_events.processing_result = 'processing'
                   AND stripe_webhook_events.processing_started_at < NOW() - ($5 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(event_type)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(pool)
        .await?;

        Ok(claimed.is_some())
    }

    /// Record the outcome of a claimed event
    async fn record_result(pool: &PgPool, event_id: &str, result: &BillingResult<()>) {
        let (processing_result, error_message) = match result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(event_id)
        .execute(pool)
        .await
        {
            // The event may look stuck in 'processing' until the timeout
            // re-claim path picks it up again.
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to record webhook processing result"
            );
        }
    }

    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        let event_owned = event.clone();

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event_owned).await?;
            }
            EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_updated(event_owned).await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event_owned).await?;
            }
            EventType::InvoicePaymentSucceeded => {
                self.handle_invoice_payment_succeeded(event_owned).await?;
            }
            EventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(event_owned).await?;
            }
            _ => {
                // Acknowledged so Stripe does not retry events we ignore
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
            }
        }

        Ok(())
    }

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected CheckoutSession".to_string(),
                ))
            }
        };

        if !session_is_reconcilable(session.mode, session.metadata.as_ref()) {
            // Not a session this system created (payment/setup mode, or no
            // metadata); acknowledge so Stripe does not redeliver
            tracing::info!(
                session_id = %session.id,
                mode = ?session.mode,
                "Checkout session is not a subscription checkout of ours, ignoring"
            );
            return Ok(());
        }

        let metadata = match &session.metadata {
            Some(metadata) => metadata,
            None => return Ok(()),
        };

        let checkout = CheckoutKind::from_metadata(metadata)?;

        let subscription_id = session.subscription.ok_or_else(|| {
            BillingError::WebhookEventNotSupported(
                "Checkout session has no subscription".to_string(),
            )
        })?;
        let parsed_sub_id = subscription_id.id().parse().map_err(|e| {
            tracing::error!("Failed to parse subscription ID: {}", e);
            BillingError::Internal(format!("Bad subscription id: {}", subscription_id.id()))
        })?;

        // The session alone carries neither the renewal timestamp nor the
        // customer id; fetch the full subscription for those.
        let subscription =
            Subscription::retrieve(self.stripe.inner(), &parsed_sub_id, &[]).await?;

        match checkout {
            CheckoutKind::Primary(primary) => {
                self.apply_primary_checkout(&event_id, &primary, &subscription)
                    .await
            }
            CheckoutKind::Addon(addon) => {
                self.apply_addon_checkout(&event_id, &addon, &subscription)
                    .await
            }
        }
    }

    async fn apply_primary_checkout(
        &self,
        event_id: &str,
        checkout: &PrimaryCheckout,
        subscription: &Subscription,
    ) -> BillingResult<()> {
        // Funnel bookkeeping, never blocks the billing write
        if let Some(lead_id) = checkout.signup_lead_id {
            if let Err(e) = self.tenants.mark_lead_converted(lead_id).await {
                tracing::warn!(
                    lead_id = %lead_id,
                    error = %e,
                    "Failed to mark signup lead converted"
                );
            }
        }

        let business_id = self
            .tenants
            .apply_primary_checkout(checkout, subscription)
            .await?;

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(business_id, BillingEventType::SubscriptionCreated)
                    .data(serde_json::json!({
                        "plan": checkout.plan.as_str(),
                        "billing_period": checkout.billing_period.as_str(),
                        "status": format!("{:?}", subscription.status),
                    }))
                    .stripe_event(event_id)
                    .stripe_subscription(subscription.id.to_string()),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription created event");
        }

        Ok(())
    }

    async fn apply_addon_checkout(
        &self,
        event_id: &str,
        checkout: &AddonCheckout,
        subscription: &Subscription,
    ) -> BillingResult<()> {
        // The add-on binds to the subscription's first line item; that item
        // id disappearing later is how we detect removal.
        let stripe_item_id = subscription
            .items
            .data
            .first()
            .map(|item| item.id.to_string());

        self.addons
            .create_subscription_addon(
                checkout.business_id,
                checkout.addon,
                stripe_item_id.as_deref(),
            )
            .await?;

        // Denormalized feature projection, best-effort
        if let Err(e) = self
            .addons
            .grant_feature(checkout.business_id, checkout.addon)
            .await
        {
            tracing::warn!(
                business_id = %checkout.business_id,
                addon_key = %checkout.addon,
                error = %e,
                "Failed to project add-on into business features"
            );
        }

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(checkout.business_id, BillingEventType::AddonActivated)
                    .data(serde_json::json!({
                        "addon_key": checkout.addon.as_str(),
                        "addon_name": checkout.addon.display_name(),
                        "monthly_price_cents": checkout.addon.price_cents(),
                        "stripe_item_id": stripe_item_id,
                    }))
                    .stripe_event(event_id)
                    .stripe_subscription(subscription.id.to_string()),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log addon activated event");
        }

        Ok(())
    }

    async fn handle_subscription_updated(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = self.extract_subscription(event)?;

        // A standalone add-on subscription names its add-on and business in
        // its own metadata and is reconciled directly, not via item diffing.
        if let Some((business_id, addon)) = self.standalone_addon_of(&subscription)? {
            let status = addon_status_for_parent(map_subscription_status(subscription.status));
            return self
                .sync_standalone_addon(business_id, addon, status, &subscription)
                .await;
        }

        let business_id = self.tenants.apply_subscription_updated(&subscription).await?;

        let parent_status = map_subscription_status(subscription.status);
        let current_item_ids: Vec<String> = subscription
            .items
            .data
            .iter()
            .map(|item| item.id.to_string())
            .collect();

        let addons = self
            .addons
            .get_business_subscription_addons(business_id)
            .await?;

        for (addon_id, status) in
            plan_addon_transitions(parent_status, &addons, &current_item_ids)
        {
            self.addons
                .update_subscription_addon_status(addon_id, status)
                .await?;
            tracing::info!(
                business_id = %business_id,
                addon_id = %addon_id,
                status = %status,
                "Add-on reconciled with subscription"
            );
        }

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(business_id, BillingEventType::SubscriptionUpdated)
                    .data(serde_json::json!({
                        "status": parent_status.as_str(),
                        "cancel_at_period_end": subscription.cancel_at_period_end,
                    }))
                    .stripe_event(&event_id)
                    .stripe_subscription(subscription.id.to_string()),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription updated event");
        }

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = self.extract_subscription(event)?;

        if let Some((business_id, addon)) = self.standalone_addon_of(&subscription)? {
            return self
                .sync_standalone_addon(business_id, addon, AddonStatus::Canceled, &subscription)
                .await;
        }

        let business_id = self
            .tenants
            .apply_subscription_deleted(subscription.id.as_str())
            .await?;

        let canceled = self.addons.cancel_all_for_business(business_id).await?;
        if canceled > 0 {
            tracing::info!(
                business_id = %business_id,
                addons_canceled = canceled,
                "Canceled add-ons with primary subscription"
            );
        }

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(business_id, BillingEventType::SubscriptionCanceled)
                    .data(serde_json::json!({
                        "addons_canceled": canceled,
                        "period_end": subscription.current_period_end,
                    }))
                    .stripe_event(&event_id)
                    .stripe_subscription(subscription.id.to_string()),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription deleted event");
        }

        Ok(())
    }

    /// Invoice paid: restore add-ons that were degraded by a failed charge
    async fn handle_invoice_payment_succeeded(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let invoice = self.extract_invoice(event)?;

        let sub_id = match Self::invoice_subscription_id(&invoice) {
            Some(id) => id,
            None => return Ok(()),
        };

        let business_id = match self.tenants.find_by_subscription(&sub_id).await? {
            Some((id, _)) => id,
            None => {
                // Standalone add-on subscriptions invoice separately; their
                // state is driven by subscription events instead.
                tracing::info!(
                    subscription_id = %sub_id,
                    "Invoice paid for unknown subscription, ignoring"
                );
                return Ok(());
            }
        };

        let restored = self.addons.restore_past_due(business_id).await?;
        if restored > 0 {
            tracing::info!(
                business_id = %business_id,
                addons_restored = restored,
                "Restored past-due add-ons after payment"
            );
        }

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(business_id, BillingEventType::InvoicePaid)
                    .data(serde_json::json!({
                        "amount_paid_cents": invoice.amount_paid,
                        "addons_restored": restored,
                    }))
                    .stripe_event(&event_id)
                    .stripe_subscription(sub_id),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log invoice paid event");
        }

        Ok(())
    }

    /// Invoice failed: degrade add-on access without deleting state
    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let invoice = self.extract_invoice(event)?;

        let sub_id = match Self::invoice_subscription_id(&invoice) {
            Some(id) => id,
            None => return Ok(()),
        };

        let business_id = match self.tenants.find_by_subscription(&sub_id).await? {
            Some((id, _)) => id,
            None => {
                tracing::info!(
                    subscription_id = %sub_id,
                    "Invoice failed for unknown subscription, ignoring"
                );
                return Ok(());
            }
        };

        let degraded = self.addons.degrade_active(business_id).await?;
        if degraded > 0 {
            tracing::warn!(
                business_id = %business_id,
                addons_degraded = degraded,
                "Degraded add-ons after failed payment"
            );
        }

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventRecord::new(business_id, BillingEventType::InvoiceFailed)
                    .data(serde_json::json!({
                        "amount_due_cents": invoice.amount_due,
                        "addons_degraded": degraded,
                        "attempt_count": invoice.attempt_count,
                    }))
                    .stripe_event(&event_id)
                    .stripe_subscription(sub_id),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log invoice failed event");
        }

        Ok(())
    }

    /// Upsert-then-set so a standalone add-on event arriving before its
    /// checkout event still converges
    async fn sync_standalone_addon(
        &self,
        business_id: Uuid,
        addon: crate::addons::AddonKey,
        status: AddonStatus,
        subscription: &Subscription,
    ) -> BillingResult<()> {
        let stored = self.addons.get_addon_status(business_id, addon).await?;
        if !standalone_event_applies(stored) {
            tracing::info!(
                business_id = %business_id,
                addon_key = %addon,
                subscription_id = %subscription.id,
                "Subscription event for locally canceled add-on, ignoring"
            );
            return Ok(());
        }

        let stripe_item_id = subscription
            .items
            .data
            .first()
            .map(|item| item.id.to_string());

        let addon_id = self
            .addons
            .create_subscription_addon(business_id, addon, stripe_item_id.as_deref())
            .await?;

        if status != AddonStatus::Active {
            self.addons
                .update_subscription_addon_status(addon_id, status)
                .await?;
        }

        tracing::info!(
            business_id = %business_id,
            addon_key = %addon,
            status = %status,
            subscription_id = %subscription.id,
            "Standalone add-on subscription reconciled"
        );

        if status == AddonStatus::Canceled {
            if let Err(e) = self
                .event_logger
                .log_event(
                    BillingEventRecord::new(business_id, BillingEventType::AddonCanceled)
                        .data(serde_json::json!({
                            "addon_key": addon.as_str(),
                            "addon_name": addon.display_name(),
                        }))
                        .stripe_subscription(subscription.id.to_string()),
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to log addon canceled event");
            }
        }

        Ok(())
    }

    /// Extract the (business, add-on) identity of a standalone add-on
    /// subscription from its metadata, if present
    fn standalone_addon_of(
        &self,
        subscription: &Subscription,
    ) -> BillingResult<Option<(Uuid, crate::addons::AddonKey)>> {
        let addon = match addon_key_from_metadata(&subscription.metadata) {
            Ok(Some(addon)) => addon,
            Ok(None) => return Ok(None),
            Err(e) => {
                // An unknown key on a subscription we did not create should
                // not poison the primary reconciliation path
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Unrecognized add-on metadata on subscription"
                );
                return Ok(None);
            }
        };

        let business_id = match subscription.metadata.get("business_id") {
            Some(raw) => Uuid::parse_str(raw).map_err(|_| {
                BillingError::InvalidMetadata(format!("business_id is not a UUID: {}", raw))
            })?,
            None => return Ok(None),
        };

        Ok(Some((business_id, addon)))
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Subscription".to_string(),
            )),
        }
    }

    fn extract_invoice(&self, event: Event) -> BillingResult<Invoice> {
        match event.data.object {
            EventObject::Invoice(invoice) => Ok(invoice),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Invoice".to_string(),
            )),
        }
    }

    fn invoice_subscription_id(invoice: &Invoice) -> Option<String> {
        match &invoice.subscription {
            Some(Expandable::Id(id)) => Some(id.to_string()),
            Some(Expandable::Object(s)) => Some(s.id.to_string()),
            None => None,
        }
    }
}


#[cfg(test)]
mod ledger_tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_duplicate_event_is_not_reclaimed_while_in_flight(pool: PgPool) {
        let first = WebhookHandler::claim_event(&pool, "evt_dup", "invoice.payment_succeeded", now())
            .await
            .unwrap();
        assert!(first);

        let second = WebhookHandler::claim_event(&pool, "evt_dup", "invoice.payment_succeeded", now())
            .await
            .unwrap();
        assert!(!second);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_succeeded_event_is_acked_as_duplicate(pool: PgPool) {
        assert!(WebhookHandler::claim_event(&pool, "evt_ok", "checkout.session.completed", now())
            .await
            .unwrap());
        WebhookHandler::record_result(&pool, "evt_ok", &Ok(())).await;

        let reclaimed = WebhookHandler::claim_event(&pool, "evt_ok", "checkout.session.completed", now())
            .await
            .unwrap();
        assert!(!reclaimed);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_errored_event_is_reclaimed_on_redelivery(pool: PgPool) {
        assert!(WebhookHandler::claim_event(&pool, "evt_err", "customer.subscription.updated", now())
            .await
            .unwrap());
        WebhookHandler::record_result(
            &pool,
            "evt_err",
            &Err(BillingError::Internal("downstream unavailable".to_string())),
        )
        .await;

        let reclaimed = WebhookHandler::claim_event(&pool, "evt_err", "customer.subscription.updated", now())
            .await
            .unwrap();
        assert!(reclaimed);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_stale_processing_event_is_reclaimed(pool: PgPool) {
        assert!(WebhookHandler::claim_event(&pool, "evt_stale", "invoice.payment_failed", now())
            .await
            .unwrap());

        // Simulate a crashed worker that never recorded a result
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_started_at = NOW() - INTERVAL '31 minutes'
            WHERE stripe_event_id = $1
            "#,
        )
        .bind("evt_stale")
        .execute(&pool)
        .await
        .unwrap();

        let reclaimed = WebhookHandler::claim_event(&pool, "evt_stale", "invoice.payment_failed", now())
            .await
            .unwrap();
        assert!(reclaimed);
    }
}
