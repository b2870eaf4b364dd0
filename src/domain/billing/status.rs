//! Subscription status state machine.
//!
//! `None` is only ever the starting point. `Inactive` is stable: the only way
//! out is a fresh checkout, which the transition functions enforce.

use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};

/// Local subscription status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Account exists but has never completed checkout.
    None,

    /// Paid up for the current billing window.
    Active,

    /// The most recent invoice could not be collected.
    PaymentFailed,

    /// Subscription ended or was cancelled. Re-entered only via checkout.
    Inactive,
}

impl SubscriptionStatus {
    /// Maps a provider-reported subscription status into the local enum.
    ///
    /// Returns `None` for any status string this service does not recognise;
    /// the caller must reject the event rather than guess.
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "past_due" | "unpaid" | "incomplete" => Some(SubscriptionStatus::PaymentFailed),
            "canceled" | "incomplete_expired" | "paused" => Some(SubscriptionStatus::Inactive),
            _ => None,
        }
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PaymentFailed => "payment_failed",
            SubscriptionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SubscriptionStatus::None),
            "active" => Ok(SubscriptionStatus::Active),
            "payment_failed" => Ok(SubscriptionStatus::PaymentFailed),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (None | Active | PaymentFailed, Active | PaymentFailed | Inactive)
                | (Inactive, Active | Inactive)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            None | Active | PaymentFailed => vec![Active, PaymentFailed, Inactive],
            Inactive => vec![Active, Inactive],
        }
    }
}
