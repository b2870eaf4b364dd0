//! Account subscription record.
//!
//! The current-state projection of an account's billing status. One per
//! account, created by the signup flow and mutated only by transitions.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, EventId, Timestamp, ValidationError};

use super::SubscriptionStatus;

/// Billing window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl BillingPeriod {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Window of `interval` length beginning at `start`.
    pub fn starting_at(start: Timestamp, interval: Duration) -> Self {
        Self {
            start,
            end: start.plus(interval),
        }
    }
}

/// Subscription state for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub account_id: AccountId,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub plan_id: Option<String>,
    pub status: SubscriptionStatus,
    pub period_start: Option<Timestamp>,
    /// Exclusive.
    pub period_end: Option<Timestamp>,
    /// Diagnostics only; ordering is never enforced against it.
    pub last_applied_event_id: Option<EventId>,
    /// Optimistic concurrency token, bumped by the store on every commit.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SubscriptionRecord {
    /// Creates the record a freshly signed-up account starts with.
    pub fn open(account_id: AccountId, now: Timestamp) -> Self {
        Self {
            account_id,
            provider_customer_id: None,
            provider_subscription_id: None,
            plan_id: None,
            status: SubscriptionStatus::None,
            period_start: None,
            period_end: None,
            last_applied_event_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The billing window, if both ends are known.
    pub fn period(&self) -> Option<BillingPeriod> {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => Some(BillingPeriod::new(start, end)),
            _ => None,
        }
    }

    pub fn set_period(&mut self, period: BillingPeriod) {
        self.period_start = Some(period.start);
        self.period_end = Some(period.end);
    }

    /// Validates the record-level invariants.
    ///
    /// - `Active` requires a period end, after the period start when known.
    /// - `None` carries no provider identifiers.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        match self.status {
            SubscriptionStatus::Active => {
                let end = self.period_end.ok_or_else(|| {
                    ValidationError::empty_field("period_end")
                })?;
                if let Some(start) = self.period_start {
                    if !end.is_after(&start) {
                        return Err(ValidationError::invalid_format(
                            "period_end",
                            "active period must end after it starts",
                        ));
                    }
                }
            }
            SubscriptionStatus::None => {
                if self.provider_customer_id.is_some() || self.provider_subscription_id.is_some() {
                    return Err(ValidationError::invalid_format(
                        "status",
                        "an account without a subscription cannot carry provider ids",
                    ));
                }
            }
            SubscriptionStatus::PaymentFailed | SubscriptionStatus::Inactive => {}
        }
        Ok(())
    }
}
