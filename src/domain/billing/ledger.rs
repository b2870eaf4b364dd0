//! Payment ledger entries.
//!
//! Append-only history of payment attempts. Totals are always a fold over an
//! account's entries, never read off the subscription record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, EventId, LedgerEntryId, Timestamp, ValidationError};

/// Result of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(PaymentOutcome::Success),
            "failed" => Ok(PaymentOutcome::Failed),
            other => Err(ValidationError::invalid_format(
                "outcome",
                format!("unknown payment outcome '{}'", other),
            )),
        }
    }
}

/// One immutable payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    pub plan_id: Option<String>,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub occurred_at: Timestamp,
    pub outcome: PaymentOutcome,
    pub source_event_id: EventId,
}

/// The parts of a charge an event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub amount: i64,
    pub currency: String,
    pub plan_id: Option<String>,
}

impl LedgerEntry {
    /// Records a collected payment.
    pub fn success(
        account_id: AccountId,
        charge: &Charge,
        occurred_at: Timestamp,
        source_event_id: EventId,
    ) -> Self {
        Self::record(account_id, charge, occurred_at, PaymentOutcome::Success, source_event_id)
    }

    /// Records a payment attempt that could not be collected.
    pub fn failed(
        account_id: AccountId,
        charge: &Charge,
        occurred_at: Timestamp,
        source_event_id: EventId,
    ) -> Self {
        Self::record(account_id, charge, occurred_at, PaymentOutcome::Failed, source_event_id)
    }

    fn record(
        account_id: AccountId,
        charge: &Charge,
        occurred_at: Timestamp,
        outcome: PaymentOutcome,
        source_event_id: EventId,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            account_id,
            plan_id: charge.plan_id.clone(),
            amount: charge.amount,
            currency: charge.currency.clone(),
            occurred_at,
            outcome,
            source_event_id,
        }
    }
}

/// Aggregate view over an account's ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Sum of successful amounts, in minor units.
    pub total_collected: i64,
    pub successful_payments: u32,
    pub failed_payments: u32,
    pub last_payment_at: Option<Timestamp>,
}

impl LedgerSummary {
    /// Folds entries into a summary. Entry order does not matter.
    pub fn fold(entries: &[LedgerEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, entry| {
            match entry.outcome {
                PaymentOutcome::Success => {
                    acc.total_collected = acc.total_collected.saturating_add(entry.amount);
                    acc.successful_payments += 1;
                    acc.last_payment_at = match acc.last_payment_at {
                        Some(prev) if prev.is_after(&entry.occurred_at) => Some(prev),
                        _ => Some(entry.occurred_at),
                    };
                }
                PaymentOutcome::Failed => acc.failed_payments += 1,
            }
            acc
        })
    }
}
