//! EventMarkerStore port - the idempotency guard for provider deliveries.
//!
//! Every delivery is admitted against the processed-event marker set before
//! any handler runs. Providers deliver at least once, so the same event id
//! routinely arrives twice, sometimes concurrently.

use async_trait::async_trait;

use crate::domain::billing::{MarkerClaim, MarkerOutcome, ProcessedEventMarker};
use crate::domain::foundation::{DomainError, EventId, Timestamp};

/// Result of attempting to admit an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First live delivery of this id; the caller owns processing.
    Admitted,
    /// Already applied, ignored, or in flight elsewhere.
    Duplicate,
}

/// Port for the processed event marker set.
///
/// `admit` must be a single atomic conditional write (a primary key plus
/// `ON CONFLICT ... WHERE` in SQL). A read followed by a write lets two
/// concurrent deliveries both win.
#[async_trait]
pub trait EventMarkerStore: Send + Sync {
    /// Admits `event_id`, leaving a `Pending` marker.
    ///
    /// An existing marker is taken over only when it is `Rejected`, or
    /// `Pending` with `received_at` before `lease_expired_before`.
    async fn admit(
        &self,
        event_id: &EventId,
        event_kind: &str,
        now: Timestamp,
        lease_expired_before: Timestamp,
    ) -> Result<Admission, DomainError>;

    /// Records what became of an admitted event.
    ///
    /// Only the `Pending` marker `claim` admitted is updated; settled markers
    /// and markers taken over by a later delivery keep their state. Returns
    /// false when nothing was updated.
    async fn mark_outcome(
        &self,
        claim: &MarkerClaim,
        outcome: MarkerOutcome,
        now: Timestamp,
    ) -> Result<bool, DomainError>;

    /// Finds the marker for an event id.
    async fn find(&self, event_id: &EventId) -> Result<Option<ProcessedEventMarker>, DomainError>;

    /// Deletes `Rejected` markers received before `cutoff`.
    ///
    /// A rejected id is re-admitted on redelivery whether or not its marker
    /// exists, so removing it changes nothing. `Applied`, `Ignored`, and
    /// `Pending` markers are never deleted. Returns the number removed.
    async fn delete_rejected_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_marker_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn EventMarkerStore) {}
    }

    #[test]
    fn admission_variants_are_distinct() {
        assert_ne!(Admission::Admitted, Admission::Duplicate);
    }
}
