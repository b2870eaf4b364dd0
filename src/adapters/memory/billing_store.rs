//! In-memory billing store for tests and local runs.
//!
//! One `tokio::sync::Mutex` guards records, ledger, and markers together,
//! modelling a single database: every port call is atomic with respect to
//! every other. Commits stage their writes on a copy and swap it in only at
//! the end, so an injected fault leaves nothing behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::billing::{
    LedgerEntry, MarkerClaim, MarkerOutcome, ProcessedEventMarker, SubscriptionRecord,
};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, EventId, Timestamp};
use crate::ports::{
    Admission, CommitResult, EventMarkerStore, LedgerReader, SubscriptionStore,
};

#[derive(Debug, Clone, Default)]
struct State {
    records: HashMap<AccountId, SubscriptionRecord>,
    ledger: Vec<LedgerEntry>,
    markers: HashMap<EventId, ProcessedEventMarker>,
}

/// Faults a test can arm before driving the store.
#[derive(Debug, Default)]
struct Faults {
    /// Fail the next commit after the record write is staged.
    fail_next_commit: AtomicBool,
    /// Number of upcoming commits to answer with `VersionConflict`.
    forced_conflicts: AtomicU32,
    /// Every call fails with `DatabaseError`.
    unavailable: AtomicBool,
    /// Delay applied inside every commit, in milliseconds.
    commit_delay_ms: AtomicU64,
}

/// In-memory implementation of all three billing ports.
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: Mutex<State>,
    faults: Faults,
    commits: AtomicU32,
}

impl InMemoryBillingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Fault Injection ===

    /// Makes the next commit fail between the record write and the ledger append.
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Makes the next `n` commits report a version conflict.
    pub fn force_version_conflicts(&self, n: u32) {
        self.faults.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Toggles simulated storage unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every commit, for deadline tests.
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    // === Test Helpers ===

    /// Number of commits that reached the store, including failed ones.
    pub fn commit_attempts(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of markers currently stored.
    pub async fn marker_count(&self) -> usize {
        self.state.lock().await.markers.len()
    }

    /// Inserts a marker as-is, bypassing admission.
    pub async fn insert_marker(&self, marker: ProcessedEventMarker) {
        self.state
            .lock()
            .await
            .markers
            .insert(marker.event_id.clone(), marker);
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "in-memory store marked unavailable",
            ));
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        self.faults
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryBillingStore {
    async fn get_subscription(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        self.check_available()?;
        Ok(self.state.lock().await.records.get(account_id).cloned())
    }

    async fn find_account_by_provider_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountId>, DomainError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .find(|r| r.provider_subscription_id.as_deref() == Some(subscription_id))
            .map(|r| r.account_id.clone()))
    }

    async fn find_account_by_provider_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountId>, DomainError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .find(|r| r.provider_customer_id.as_deref() == Some(customer_id))
            .map(|r| r.account_id.clone()))
    }

    async fn commit_transition(
        &self,
        expected_version: i64,
        next: &SubscriptionRecord,
        ledger: &[LedgerEntry],
        claim: &MarkerClaim,
    ) -> Result<CommitResult, DomainError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let delay = self.faults.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut state = self.state.lock().await;

        if self.take_forced_conflict() {
            return Ok(CommitResult::VersionConflict);
        }

        let current = state.records.get(&next.account_id).ok_or_else(|| {
            DomainError::new(ErrorCode::AccountNotFound, next.account_id.as_str())
        })?;
        if current.version != expected_version {
            return Ok(CommitResult::VersionConflict);
        }
        if !state
            .markers
            .get(&claim.event_id)
            .is_some_and(|m| m.is_claimed_by(claim))
        {
            return Ok(CommitResult::ClaimLost);
        }

        let mut staged = (*state).clone();
        let new_version = expected_version + 1;
        let mut written = next.clone();
        written.version = new_version;
        staged.records.insert(written.account_id.clone(), written);

        if self.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "injected fault between record write and ledger append",
            ));
        }

        for entry in ledger {
            if staged
                .ledger
                .iter()
                .any(|e| e.source_event_id == entry.source_event_id)
            {
                return Err(DomainError::new(
                    ErrorCode::LedgerImmutable,
                    "ledger already holds an entry for this event",
                )
                .with_detail("source_event_id", entry.source_event_id.as_str()));
            }
            staged.ledger.push(entry.clone());
        }

        if let Some(marker) = staged.markers.get_mut(&claim.event_id) {
            marker.outcome = MarkerOutcome::Applied;
            marker.updated_at = next.updated_at;
        }

        *state = staged;
        Ok(CommitResult::Committed {
            version: new_version,
        })
    }

    async fn open_account(
        &self,
        account_id: &AccountId,
        now: Timestamp,
    ) -> Result<SubscriptionRecord, DomainError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.records.contains_key(account_id) {
            return Err(DomainError::new(
                ErrorCode::AccountAlreadyExists,
                "Account already has a subscription record",
            )
            .with_detail("account_id", account_id.as_str()));
        }
        let record = SubscriptionRecord::open(account_id.clone(), now);
        state.records.insert(account_id.clone(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl LedgerReader for InMemoryBillingStore {
    async fn entries_for(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, DomainError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.occurred_at);
        Ok(entries)
    }
}

#[async_trait]
impl EventMarkerStore for InMemoryBillingStore {
    async fn admit(
        &self,
        event_id: &EventId,
        event_kind: &str,
        now: Timestamp,
        lease_expired_before: Timestamp,
    ) -> Result<Admission, DomainError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.markers.get(event_id) {
            if !existing.allows_readmission(&lease_expired_before) {
                return Ok(Admission::Duplicate);
            }
        }

        state.markers.insert(
            event_id.clone(),
            ProcessedEventMarker::pending(event_id.clone(), event_kind, now),
        );
        Ok(Admission::Admitted)
    }

    async fn mark_outcome(
        &self,
        claim: &MarkerClaim,
        outcome: MarkerOutcome,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        match state.markers.get_mut(&claim.event_id) {
            Some(marker) if marker.is_claimed_by(claim) => {
                marker.outcome = outcome;
                marker.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<ProcessedEventMarker>, DomainError> {
        self.check_available()?;
        Ok(self.state.lock().await.markers.get(event_id).cloned())
    }

    async fn delete_rejected_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let before = state.markers.len();
        state
            .markers
            .retain(|_, m| m.outcome != MarkerOutcome::Rejected || !m.received_at.is_before(&cutoff));
        Ok((before - state.markers.len()) as u64)
    }
}
