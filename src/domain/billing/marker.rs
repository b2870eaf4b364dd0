//! Processed event markers.
//!
//! One marker per admitted provider event id. The marker set is the
//! idempotency guard: a second delivery of an id that already has a live
//! marker is a duplicate. `Applied` and `Ignored` markers are kept for
//! good; only `Rejected` ones are ever pruned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{EventId, Timestamp, ValidationError};

/// What became of an admitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerOutcome {
    /// Admitted, handler still running (or crashed; see the admission lease).
    Pending,
    /// Transition committed.
    Applied,
    /// Event kind not understood; acknowledged without a state change.
    Ignored,
    /// Handler failed after admission; a redelivery may be re-admitted.
    Rejected,
}

impl MarkerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerOutcome::Pending => "pending",
            MarkerOutcome::Applied => "applied",
            MarkerOutcome::Ignored => "ignored",
            MarkerOutcome::Rejected => "rejected",
        }
    }

    /// Returns true if the marker still blocks re-admission on its own.
    ///
    /// Pending markers block only until their lease runs out.
    pub fn is_settled(&self) -> bool {
        matches!(self, MarkerOutcome::Applied | MarkerOutcome::Ignored)
    }
}

impl fmt::Display for MarkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkerOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MarkerOutcome::Pending),
            "applied" => Ok(MarkerOutcome::Applied),
            "ignored" => Ok(MarkerOutcome::Ignored),
            "rejected" => Ok(MarkerOutcome::Rejected),
            other => Err(ValidationError::invalid_format(
                "outcome",
                format!("unknown marker outcome '{}'", other),
            )),
        }
    }
}

/// Persisted record of an admitted event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEventMarker {
    pub event_id: EventId,
    /// Raw provider type string.
    pub event_kind: String,
    pub received_at: Timestamp,
    pub outcome: MarkerOutcome,
    pub updated_at: Timestamp,
}

/// Ownership of one admission.
///
/// A pending marker is owned by the delivery whose admission wrote its
/// `received_at`. Once another delivery takes the marker over after the
/// lease, the earlier claim no longer matches and its writes are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerClaim {
    pub event_id: EventId,
    pub admitted_at: Timestamp,
}

impl MarkerClaim {
    pub fn new(event_id: EventId, admitted_at: Timestamp) -> Self {
        Self {
            event_id,
            admitted_at,
        }
    }
}

impl ProcessedEventMarker {
    /// A fresh in-flight marker.
    pub fn pending(event_id: EventId, event_kind: impl Into<String>, now: Timestamp) -> Self {
        Self {
            event_id,
            event_kind: event_kind.into(),
            received_at: now,
            outcome: MarkerOutcome::Pending,
            updated_at: now,
        }
    }

    /// Returns true if this marker is still the in-flight admission `claim` took.
    pub fn is_claimed_by(&self, claim: &MarkerClaim) -> bool {
        self.outcome == MarkerOutcome::Pending
            && self.event_id == claim.event_id
            && self.received_at == claim.admitted_at
    }

    /// Returns true if a new delivery of the same id may take this marker over.
    ///
    /// `lease_expired_before` is the instant a pending marker must predate to
    /// count as abandoned.
    pub fn allows_readmission(&self, lease_expired_before: &Timestamp) -> bool {
        match self.outcome {
            MarkerOutcome::Rejected => true,
            MarkerOutcome::Pending => self.received_at.is_before(lease_expired_before),
            MarkerOutcome::Applied | MarkerOutcome::Ignored => false,
        }
    }
}
