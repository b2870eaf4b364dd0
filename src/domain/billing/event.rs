//! Billing event envelope and kind resolution.
//!
//! The provider's JSON is parsed exactly once, here. Everything downstream
//! works with the closed [`BillingEvent`] variant and never looks at event
//! type strings again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, EventId, Timestamp};

use super::{BillingPeriod, Charge, SubscriptionStatus, WebhookError};

/// Metadata key an integration can set to name the account explicitly.
const ACCOUNT_ID_METADATA_KEY: &str = "account_id";

/// Metadata key carrying the local plan identifier.
const PLAN_ID_METADATA_KEY: &str = "plan_id";

// ════════════════════════════════════════════════════════════════════════════════
// Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Provider webhook envelope. Only the fields this service reads.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    #[serde(default)]
    pub created: Option<i64>,

    pub data: ProviderEventData,

    #[serde(default)]
    pub livemode: bool,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Provider Objects
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
struct CheckoutSessionObject {
    client_reference_id: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<String>,
    status: Option<String>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InvoiceObject {
    customer: Option<String>,
    subscription: Option<String>,
    amount_paid: Option<i64>,
    amount_due: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    lines: InvoiceLines,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InvoiceLines {
    #[serde(default)]
    data: Vec<InvoiceLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct InvoiceLineItem {
    period: Option<LinePeriod>,
    price: Option<LinePrice>,
}

#[derive(Debug, Clone, Deserialize)]
struct LinePeriod {
    start: i64,
    end: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct LinePrice {
    id: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Resolved Events
// ════════════════════════════════════════════════════════════════════════════════

/// How an event names the account it concerns.
///
/// Resolved against the subscription store after admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Account(AccountId),
    ProviderSubscription(String),
    ProviderCustomer(String),
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRef::Account(id) => write!(f, "account {}", id),
            AccountRef::ProviderSubscription(id) => write!(f, "subscription {}", id),
            AccountRef::ProviderCustomer(id) => write!(f, "customer {}", id),
        }
    }
}

/// State-changing effect an event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAction {
    CheckoutCompleted {
        customer_id: Option<String>,
        subscription_id: Option<String>,
        charge: Charge,
    },
    SubscriptionUpdated {
        customer_id: Option<String>,
        subscription_id: String,
        status: SubscriptionStatus,
        period: Option<BillingPeriod>,
    },
    SubscriptionDeleted {
        subscription_id: String,
    },
    InvoicePaymentFailed {
        customer_id: Option<String>,
        subscription_id: Option<String>,
        charge: Charge,
    },
    InvoicePaymentSucceeded {
        customer_id: Option<String>,
        subscription_id: Option<String>,
        charge: Charge,
        period: Option<BillingPeriod>,
    },
}

impl BillingAction {
    /// Short label for logs and transition summaries.
    pub fn label(&self) -> &'static str {
        match self {
            BillingAction::CheckoutCompleted { .. } => "checkout_completed",
            BillingAction::SubscriptionUpdated { .. } => "subscription_updated",
            BillingAction::SubscriptionDeleted { .. } => "subscription_deleted",
            BillingAction::InvoicePaymentFailed { .. } => "invoice_payment_failed",
            BillingAction::InvoicePaymentSucceeded { .. } => "invoice_payment_succeeded",
        }
    }

    /// Provider customer id carried by the event, if any.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            BillingAction::CheckoutCompleted { customer_id, .. }
            | BillingAction::SubscriptionUpdated { customer_id, .. }
            | BillingAction::InvoicePaymentFailed { customer_id, .. }
            | BillingAction::InvoicePaymentSucceeded { customer_id, .. } => customer_id.as_deref(),
            BillingAction::SubscriptionDeleted { .. } => None,
        }
    }
}

/// An event kind resolved once at the verifier boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// An event this service has a transition for.
    Recognized { target: AccountRef, action: BillingAction },
    /// Any other kind. Acknowledged, never applied.
    Unknown { kind: String },
}

/// A verified, parsed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvent {
    pub event_id: EventId,
    /// Raw provider type string, kept for the marker and for logs.
    pub kind: String,
    pub created: Option<Timestamp>,
    pub livemode: bool,
    pub event: BillingEvent,
}

impl VerifiedEvent {
    /// Parses the envelope and resolves the event kind.
    ///
    /// # Errors
    ///
    /// - `ParseError` - body is not a provider envelope, or a field has the wrong type
    /// - `MissingField` - a field required by the event kind is absent
    /// - `InvalidStateMapping` - subscription status has no local counterpart
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        let envelope: ProviderEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: ProviderEvent) -> Result<Self, WebhookError> {
        let event_id = EventId::new(envelope.id).map_err(|_| WebhookError::MissingField("id"))?;
        let created = envelope.created.and_then(Timestamp::from_unix_secs);
        let event = BillingEvent::resolve(&envelope.event_type, envelope.data.object)?;

        Ok(Self {
            event_id,
            kind: envelope.event_type,
            created,
            livemode: envelope.livemode,
            event,
        })
    }
}

impl BillingEvent {
    /// Resolves a provider event type and its data object.
    pub fn resolve(event_type: &str, object: serde_json::Value) -> Result<Self, WebhookError> {
        match event_type {
            "checkout.session.completed" => resolve_checkout(deserialize(object)?),
            "customer.subscription.updated" => resolve_subscription_updated(deserialize(object)?),
            "customer.subscription.deleted" => resolve_subscription_deleted(deserialize(object)?),
            "invoice.payment_failed" => resolve_invoice(deserialize(object)?, false),
            "invoice.payment_succeeded" => resolve_invoice(deserialize(object)?, true),
            other => Ok(BillingEvent::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

fn deserialize<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(object).map_err(|e| WebhookError::ParseError(e.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn metadata_value(metadata: &HashMap<String, String>, key: &str) -> Option<String> {
    non_empty(metadata.get(key).cloned())
}

fn account_from_metadata(metadata: &HashMap<String, String>) -> Option<AccountId> {
    metadata_value(metadata, ACCOUNT_ID_METADATA_KEY).and_then(|id| AccountId::new(id).ok())
}

/// Explicit account id first, then subscription id, then customer id.
fn account_ref(
    metadata: &HashMap<String, String>,
    subscription_id: Option<&String>,
    customer_id: Option<&String>,
) -> Option<AccountRef> {
    account_from_metadata(metadata)
        .map(AccountRef::Account)
        .or_else(|| subscription_id.cloned().map(AccountRef::ProviderSubscription))
        .or_else(|| customer_id.cloned().map(AccountRef::ProviderCustomer))
}

fn period(start: i64, end: i64) -> Result<BillingPeriod, WebhookError> {
    let start = Timestamp::from_unix_secs(start)
        .ok_or_else(|| WebhookError::ParseError("period start out of range".to_string()))?;
    let end = Timestamp::from_unix_secs(end)
        .ok_or_else(|| WebhookError::ParseError("period end out of range".to_string()))?;
    Ok(BillingPeriod::new(start, end))
}

fn currency(value: Option<String>) -> Result<String, WebhookError> {
    non_empty(value)
        .map(|c| c.to_lowercase())
        .ok_or(WebhookError::MissingField("currency"))
}

fn resolve_checkout(session: CheckoutSessionObject) -> Result<BillingEvent, WebhookError> {
    let account_id = non_empty(session.client_reference_id)
        .and_then(|id| AccountId::new(id).ok())
        .or_else(|| account_from_metadata(&session.metadata))
        .ok_or(WebhookError::MissingField("client_reference_id"))?;
    let amount = session
        .amount_total
        .ok_or(WebhookError::MissingField("amount_total"))?;

    Ok(BillingEvent::Recognized {
        target: AccountRef::Account(account_id),
        action: BillingAction::CheckoutCompleted {
            customer_id: non_empty(session.customer),
            subscription_id: non_empty(session.subscription),
            charge: Charge {
                amount,
                currency: currency(session.currency)?,
                plan_id: metadata_value(&session.metadata, PLAN_ID_METADATA_KEY),
            },
        },
    })
}

fn resolve_subscription_updated(sub: SubscriptionObject) -> Result<BillingEvent, WebhookError> {
    let provider_status = sub.status.ok_or(WebhookError::MissingField("status"))?;
    let status = SubscriptionStatus::from_provider_status(&provider_status)
        .ok_or(WebhookError::InvalidStateMapping(provider_status))?;
    let window = match (sub.current_period_start, sub.current_period_end) {
        (Some(start), Some(end)) => Some(period(start, end)?),
        _ => None,
    };
    let customer_id = non_empty(sub.customer);
    let target = account_ref(&sub.metadata, Some(&sub.id), customer_id.as_ref())
        .ok_or(WebhookError::MissingField("id"))?;

    Ok(BillingEvent::Recognized {
        target,
        action: BillingAction::SubscriptionUpdated {
            customer_id,
            subscription_id: sub.id,
            status,
            period: window,
        },
    })
}

fn resolve_subscription_deleted(sub: SubscriptionObject) -> Result<BillingEvent, WebhookError> {
    let customer_id = non_empty(sub.customer);
    let target = account_ref(&sub.metadata, Some(&sub.id), customer_id.as_ref())
        .ok_or(WebhookError::MissingField("id"))?;

    Ok(BillingEvent::Recognized {
        target,
        action: BillingAction::SubscriptionDeleted {
            subscription_id: sub.id,
        },
    })
}

fn resolve_invoice(invoice: InvoiceObject, paid: bool) -> Result<BillingEvent, WebhookError> {
    let customer_id = non_empty(invoice.customer);
    let subscription_id = non_empty(invoice.subscription);
    let target = account_ref(&invoice.metadata, subscription_id.as_ref(), customer_id.as_ref())
        .ok_or(WebhookError::MissingField("customer"))?;

    let first_line = invoice.lines.data.into_iter().next();
    let plan_id = metadata_value(&invoice.metadata, PLAN_ID_METADATA_KEY).or_else(|| {
        first_line
            .as_ref()
            .and_then(|line| line.price.as_ref())
            .map(|price| price.id.clone())
    });
    let currency = currency(invoice.currency)?;

    let action = if paid {
        let amount = invoice
            .amount_paid
            .ok_or(WebhookError::MissingField("amount_paid"))?;
        let window = match first_line.and_then(|line| line.period) {
            Some(p) => Some(period(p.start, p.end)?),
            None => None,
        };
        BillingAction::InvoicePaymentSucceeded {
            customer_id,
            subscription_id,
            charge: Charge {
                amount,
                currency,
                plan_id,
            },
            period: window,
        }
    } else {
        let amount = invoice
            .amount_due
            .ok_or(WebhookError::MissingField("amount_due"))?;
        BillingAction::InvoicePaymentFailed {
            customer_id,
            subscription_id,
            charge: Charge {
                amount,
                currency,
                plan_id,
            },
        }
    };

    Ok(BillingEvent::Recognized { target, action })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_test_1",
            "type": event_type,
            "created": 1_704_067_200,
            "livemode": false,
            "data": { "object": object }
        }))
        .unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Envelope Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn non_json_body_is_parse_error() {
        let err = VerifiedEvent::from_slice(b"not json").unwrap_err();
        assert!(matches!(err, WebhookError::ParseError(_)));
    }

    #[test]
    fn envelope_without_id_is_rejected() {
        let body = br#"{"type":"invoice.paid","data":{"object":{}}}"#;
        assert!(matches!(
            VerifiedEvent::from_slice(body),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn empty_event_id_is_missing_field() {
        let body = br#"{"id":"","type":"invoice.paid","data":{"object":{}}}"#;
        assert_eq!(
            VerifiedEvent::from_slice(body),
            Err(WebhookError::MissingField("id"))
        );
    }

    #[test]
    fn unknown_kind_resolves_without_reading_object() {
        let event = VerifiedEvent::from_slice(&envelope("payment_intent.succeeded", json!("anything"))).unwrap();
        assert_eq!(event.kind, "payment_intent.succeeded");
        assert_eq!(
            event.event,
            BillingEvent::Unknown {
                kind: "payment_intent.succeeded".to_string()
            }
        );
    }

    #[test]
    fn envelope_keeps_id_and_created() {
        let event = VerifiedEvent::from_slice(&envelope("invoice.paid", json!({}))).unwrap();
        assert_eq!(event.event_id.as_str(), "evt_test_1");
        assert_eq!(event.created.map(|t| t.as_unix_secs()), Some(1_704_067_200));
        assert!(!event.livemode);
    }

    // ══════════════════════════════════════════════════════════════
    // Checkout Resolution
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn checkout_resolves_account_from_client_reference_id() {
        let event = VerifiedEvent::from_slice(&envelope(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "client_reference_id": "acct-9",
                "customer": "cus_1",
                "subscription": "sub_1",
                "amount_total": 1999,
                "currency": "USD",
                "metadata": { "plan_id": "plan_pro" }
            }),
        ))
        .unwrap();

        match event.event {
            BillingEvent::Recognized {
                target,
                action: BillingAction::CheckoutCompleted { customer_id, subscription_id, charge },
            } => {
                assert_eq!(target, AccountRef::Account(AccountId::new("acct-9").unwrap()));
                assert_eq!(customer_id.as_deref(), Some("cus_1"));
                assert_eq!(subscription_id.as_deref(), Some("sub_1"));
                assert_eq!(charge.amount, 1999);
                assert_eq!(charge.currency, "usd");
                assert_eq!(charge.plan_id.as_deref(), Some("plan_pro"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn checkout_falls_back_to_metadata_account_id() {
        let event = BillingEvent::resolve(
            "checkout.session.completed",
            json!({
                "client_reference_id": null,
                "amount_total": 500,
                "currency": "usd",
                "metadata": { "account_id": "acct-meta" }
            }),
        )
        .unwrap();
        assert!(matches!(
            event,
            BillingEvent::Recognized { target: AccountRef::Account(id), .. } if id.as_str() == "acct-meta"
        ));
    }

    #[test]
    fn checkout_without_account_is_missing_field() {
        let err = BillingEvent::resolve(
            "checkout.session.completed",
            json!({ "amount_total": 500, "currency": "usd" }),
        )
        .unwrap_err();
        assert_eq!(err, WebhookError::MissingField("client_reference_id"));
    }

    #[test]
    fn checkout_without_amount_is_missing_field() {
        let err = BillingEvent::resolve(
            "checkout.session.completed",
            json!({ "client_reference_id": "acct-1", "currency": "usd" }),
        )
        .unwrap_err();
        assert_eq!(err, WebhookError::MissingField("amount_total"));
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription Resolution
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn subscription_update_maps_status_and_window() {
        let event = BillingEvent::resolve(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "current_period_start": 1_000,
                "current_period_end": 2_000
            }),
        )
        .unwrap();

        match event {
            BillingEvent::Recognized {
                target,
                action: BillingAction::SubscriptionUpdated { status, period, .. },
            } => {
                assert_eq!(target, AccountRef::ProviderSubscription("sub_1".to_string()));
                assert_eq!(status, SubscriptionStatus::PaymentFailed);
                let period = period.unwrap();
                assert_eq!(period.start.as_unix_secs(), 1_000);
                assert_eq!(period.end.as_unix_secs(), 2_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subscription_update_with_unknown_status_is_invalid_mapping() {
        let err = BillingEvent::resolve(
            "customer.subscription.updated",
            json!({ "id": "sub_1", "status": "frozen" }),
        )
        .unwrap_err();
        assert_eq!(err, WebhookError::InvalidStateMapping("frozen".to_string()));
    }

    #[test]
    fn subscription_metadata_account_wins_over_provider_ids() {
        let event = BillingEvent::resolve(
            "customer.subscription.deleted",
            json!({ "id": "sub_1", "customer": "cus_1", "metadata": { "account_id": "acct-3" } }),
        )
        .unwrap();
        assert!(matches!(
            event,
            BillingEvent::Recognized { target: AccountRef::Account(id), .. } if id.as_str() == "acct-3"
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Invoice Resolution
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn failed_invoice_uses_amount_due() {
        let event = BillingEvent::resolve(
            "invoice.payment_failed",
            json!({
                "customer": "cus_1",
                "subscription": "sub_1",
                "amount_paid": 0,
                "amount_due": 1999,
                "currency": "usd"
            }),
        )
        .unwrap();

        match event {
            BillingEvent::Recognized {
                target,
                action: BillingAction::InvoicePaymentFailed { charge, .. },
            } => {
                assert_eq!(target, AccountRef::ProviderSubscription("sub_1".to_string()));
                assert_eq!(charge.amount, 1999);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn paid_invoice_takes_period_and_price_from_first_line() {
        let event = BillingEvent::resolve(
            "invoice.payment_succeeded",
            json!({
                "customer": "cus_1",
                "amount_paid": 1999,
                "amount_due": 1999,
                "currency": "usd",
                "lines": { "data": [
                    { "period": { "start": 5_000, "end": 9_000 }, "price": { "id": "price_1" } },
                    { "period": { "start": 1, "end": 2 } }
                ]}
            }),
        )
        .unwrap();

        match event {
            BillingEvent::Recognized {
                target,
                action: BillingAction::InvoicePaymentSucceeded { charge, period, .. },
            } => {
                assert_eq!(target, AccountRef::ProviderCustomer("cus_1".to_string()));
                assert_eq!(charge.plan_id.as_deref(), Some("price_1"));
                assert_eq!(period.map(|p| p.start.as_unix_secs()), Some(5_000));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invoice_without_any_reference_is_missing_field() {
        let err = BillingEvent::resolve(
            "invoice.payment_failed",
            json!({ "amount_due": 10, "currency": "usd" }),
        )
        .unwrap_err();
        assert_eq!(err, WebhookError::MissingField("customer"));
    }

    #[test]
    fn invoice_with_wrong_field_type_is_parse_error() {
        let err = BillingEvent::resolve(
            "invoice.payment_failed",
            json!({ "customer": "cus_1", "amount_due": "lots", "currency": "usd" }),
        )
        .unwrap_err();
        assert!(matches!(err, WebhookError::ParseError(_)));
    }
}
