//! PruneProcessedEventsHandler - retention for rejected processed-event markers.

use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::EventMarkerStore;

/// Deletes `Rejected` markers older than the retention window.
///
/// Applied and ignored markers are the duplicate guard and are kept for good;
/// the store never removes them, nor pending ones.
pub struct PruneProcessedEventsHandler {
    markers: Arc<dyn EventMarkerStore>,
    retention: Duration,
}

impl PruneProcessedEventsHandler {
    pub fn new(markers: Arc<dyn EventMarkerStore>, retention: Duration) -> Self {
        Self { markers, retention }
    }

    pub async fn handle(&self) -> Result<u64, DomainError> {
        self.handle_at(Timestamp::now()).await
    }

    /// Prunes as of `now`, returning the number of markers removed.
    pub async fn handle_at(&self, now: Timestamp) -> Result<u64, DomainError> {
        let cutoff = now.plus(-self.retention);
        let deleted = self.markers.delete_rejected_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff.as_datetime(), "pruned rejected event markers");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{MarkerOutcome, ProcessedEventMarker};
    use crate::domain::foundation::EventId;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn marker(id: &str, received: i64, outcome: MarkerOutcome) -> ProcessedEventMarker {
        let mut marker = ProcessedEventMarker::pending(
            EventId::new(id).unwrap(),
            "invoice.payment_failed",
            ts(received),
        );
        marker.outcome = outcome;
        marker
    }

    #[tokio::test]
    async fn removes_only_rejected_markers_past_retention() {
        let store = Arc::new(InMemoryBillingStore::new());
        let day = 86_400;
        store.insert_marker(marker("evt_old_applied", 0, MarkerOutcome::Applied)).await;
        store.insert_marker(marker("evt_old_ignored", 0, MarkerOutcome::Ignored)).await;
        store.insert_marker(marker("evt_old_pending", 0, MarkerOutcome::Pending)).await;
        store.insert_marker(marker("evt_old_rejected", 0, MarkerOutcome::Rejected)).await;
        store.insert_marker(marker("evt_recent_rejected", 40 * day, MarkerOutcome::Rejected)).await;

        let handler = PruneProcessedEventsHandler::new(store.clone(), Duration::days(30));
        let deleted = handler.handle_at(ts(45 * day)).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(store.marker_count().await, 4);
        assert!(store.find(&EventId::new("evt_old_rejected").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn applied_and_ignored_markers_survive_any_retention() {
        let store = Arc::new(InMemoryBillingStore::new());
        store.insert_marker(marker("evt_applied", 0, MarkerOutcome::Applied)).await;
        store.insert_marker(marker("evt_ignored", 0, MarkerOutcome::Ignored)).await;

        let handler = PruneProcessedEventsHandler::new(store.clone(), Duration::days(1));
        handler.handle_at(ts(10 * 365 * 86_400)).await.unwrap();

        let applied = store.find(&EventId::new("evt_applied").unwrap()).await.unwrap().unwrap();
        let ignored = store.find(&EventId::new("evt_ignored").unwrap()).await.unwrap().unwrap();
        assert_eq!(applied.outcome, MarkerOutcome::Applied);
        assert_eq!(ignored.outcome, MarkerOutcome::Ignored);
    }

    #[tokio::test]
    async fn nothing_to_prune_returns_zero() {
        let store = Arc::new(InMemoryBillingStore::new());
        let handler = PruneProcessedEventsHandler::new(store, Duration::days(30));

        assert_eq!(handler.handle_at(ts(1_000)).await.unwrap(), 0);
    }
}
