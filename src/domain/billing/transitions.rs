//! Pure subscription transitions.
//!
//! One function per event kind: `(current record, action) -> (next record,
//! ledger entries)`. No I/O happens here; the caller commits the result as a
//! single unit and bumps the version.

use chrono::Duration;
use serde::Serialize;

use crate::domain::foundation::{AccountId, EventId, StateMachine, Timestamp};

use super::{
    BillingAction, BillingPeriod, Charge, LedgerEntry, SubscriptionRecord, SubscriptionStatus,
    WebhookError,
};

/// Inputs a transition needs besides the record and the event.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub now: Timestamp,
    /// When the provider says the event happened; stamped on ledger entries.
    pub occurred_at: Timestamp,
    /// Window length granted by a checkout when the provider sends none.
    pub billing_interval: Duration,
    pub event_id: EventId,
}

/// Structured result of a transition, for logs and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub kind: &'static str,
    pub account_id: AccountId,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub ledger_appended: usize,
}

/// Next record plus the ledger entries to append with it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub next: SubscriptionRecord,
    pub ledger: Vec<LedgerEntry>,
    pub summary: TransitionSummary,
}

/// Computes the effect of `action` on `record`.
///
/// # Errors
///
/// `InvariantViolation` if the computed record fails
/// [`SubscriptionRecord::check_invariants`]; nothing is returned to commit.
pub fn apply(
    record: &SubscriptionRecord,
    action: &BillingAction,
    ctx: &TransitionContext,
) -> Result<Transition, WebhookError> {
    let (next, ledger) = match action {
        BillingAction::CheckoutCompleted {
            customer_id,
            subscription_id,
            charge,
        } => checkout_completed(record, customer_id, subscription_id, charge, ctx)?,
        BillingAction::SubscriptionUpdated {
            customer_id,
            subscription_id,
            status,
            period,
        } => subscription_updated(record, customer_id, subscription_id, *status, *period, ctx)?,
        BillingAction::SubscriptionDeleted { .. } => subscription_deleted(record)?,
        BillingAction::InvoicePaymentFailed {
            customer_id,
            subscription_id,
            charge,
        } => invoice_payment_failed(record, customer_id, subscription_id, charge, ctx)?,
        BillingAction::InvoicePaymentSucceeded {
            customer_id,
            subscription_id,
            charge,
            period,
        } => invoice_payment_succeeded(record, customer_id, subscription_id, charge, *period, ctx)?,
    };

    finish(record, next, ledger, action.label(), ctx)
}

fn checkout_completed(
    record: &SubscriptionRecord,
    customer_id: &Option<String>,
    subscription_id: &Option<String>,
    charge: &Charge,
    ctx: &TransitionContext,
) -> Result<(SubscriptionRecord, Vec<LedgerEntry>), WebhookError> {
    let mut next = record.clone();
    next.status = record
        .status
        .transition_to(SubscriptionStatus::Active)
        .map_err(|e| WebhookError::InvariantViolation(e.to_string()))?;
    next.provider_customer_id = customer_id.clone().or(next.provider_customer_id);
    next.provider_subscription_id = subscription_id.clone().or(next.provider_subscription_id);
    next.plan_id = charge.plan_id.clone().or(next.plan_id);
    next.set_period(BillingPeriod::starting_at(ctx.now, ctx.billing_interval));

    let entry = LedgerEntry::success(
        record.account_id.clone(),
        charge,
        ctx.occurred_at,
        ctx.event_id.clone(),
    );
    Ok((next, vec![entry]))
}

fn subscription_updated(
    record: &SubscriptionRecord,
    customer_id: &Option<String>,
    subscription_id: &str,
    status: SubscriptionStatus,
    period: Option<BillingPeriod>,
    ctx: &TransitionContext,
) -> Result<(SubscriptionRecord, Vec<LedgerEntry>), WebhookError> {
    let mut next = record.clone();
    next.status = settle(record.status, status)?;
    fill_provider_ids(&mut next, customer_id, &Some(subscription_id.to_string()));
    if record.status != SubscriptionStatus::Inactive {
        if let Some(period) = period {
            next.set_period(period);
        }
    }
    ensure_active_window(&mut next, ctx);
    Ok((next, Vec::new()))
}

fn subscription_deleted(
    record: &SubscriptionRecord,
) -> Result<(SubscriptionRecord, Vec<LedgerEntry>), WebhookError> {
    let mut next = record.clone();
    next.status = settle(record.status, SubscriptionStatus::Inactive)?;
    Ok((next, Vec::new()))
}

fn invoice_payment_failed(
    record: &SubscriptionRecord,
    customer_id: &Option<String>,
    subscription_id: &Option<String>,
    charge: &Charge,
    ctx: &TransitionContext,
) -> Result<(SubscriptionRecord, Vec<LedgerEntry>), WebhookError> {
    let mut next = record.clone();
    next.status = settle(record.status, SubscriptionStatus::PaymentFailed)?;
    fill_provider_ids(&mut next, customer_id, subscription_id);
    next.plan_id = charge.plan_id.clone().or(next.plan_id);

    let entry = LedgerEntry::failed(
        record.account_id.clone(),
        charge,
        ctx.occurred_at,
        ctx.event_id.clone(),
    );
    Ok((next, vec![entry]))
}

fn invoice_payment_succeeded(
    record: &SubscriptionRecord,
    customer_id: &Option<String>,
    subscription_id: &Option<String>,
    charge: &Charge,
    period: Option<BillingPeriod>,
    ctx: &TransitionContext,
) -> Result<(SubscriptionRecord, Vec<LedgerEntry>), WebhookError> {
    let mut next = record.clone();
    next.status = settle(record.status, SubscriptionStatus::Active)?;
    fill_provider_ids(&mut next, customer_id, subscription_id);
    next.plan_id = charge.plan_id.clone().or(next.plan_id);
    if next.status == SubscriptionStatus::Active {
        if let Some(period) = period {
            next.set_period(period);
        }
        ensure_active_window(&mut next, ctx);
    }

    let entry = LedgerEntry::success(
        record.account_id.clone(),
        charge,
        ctx.occurred_at,
        ctx.event_id.clone(),
    );
    Ok((next, vec![entry]))
}

/// Status after a non-checkout event.
///
/// `Inactive` is left only through a new checkout, so any other event keeps
/// an inactive account inactive.
fn settle(
    from: SubscriptionStatus,
    target: SubscriptionStatus,
) -> Result<SubscriptionStatus, WebhookError> {
    if from == SubscriptionStatus::Inactive {
        return Ok(SubscriptionStatus::Inactive);
    }
    from.transition_to(target)
        .map_err(|e| WebhookError::InvariantViolation(e.to_string()))
}

fn fill_provider_ids(
    next: &mut SubscriptionRecord,
    customer_id: &Option<String>,
    subscription_id: &Option<String>,
) {
    if next.provider_customer_id.is_none() {
        next.provider_customer_id = customer_id.clone();
    }
    if next.provider_subscription_id.is_none() {
        next.provider_subscription_id = subscription_id.clone();
    }
}

/// An active record always has a window; grant one interval if none is known.
fn ensure_active_window(next: &mut SubscriptionRecord, ctx: &TransitionContext) {
    if next.status == SubscriptionStatus::Active && next.period_end.is_none() {
        next.set_period(BillingPeriod::starting_at(ctx.now, ctx.billing_interval));
    }
}

fn finish(
    record: &SubscriptionRecord,
    mut next: SubscriptionRecord,
    ledger: Vec<LedgerEntry>,
    kind: &'static str,
    ctx: &TransitionContext,
) -> Result<Transition, WebhookError> {
    next.last_applied_event_id = Some(ctx.event_id.clone());
    next.updated_at = ctx.now;
    next.check_invariants()
        .map_err(|e| WebhookError::InvariantViolation(e.to_string()))?;

    let summary = TransitionSummary {
        kind,
        account_id: record.account_id.clone(),
        from: record.status,
        to: next.status,
        ledger_appended: ledger.len(),
    };
    Ok(Transition {
        next,
        ledger,
        summary,
    })
}
