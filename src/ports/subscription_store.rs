//! SubscriptionStore port - authoritative per-account subscription state.
//!
//! Writes go through `commit_transition` only. That one call covers the
//! record write, every ledger append, and finalising the event marker, so a
//! transition is either fully visible or not at all.

use async_trait::async_trait;

use crate::domain::billing::{LedgerEntry, MarkerClaim, SubscriptionRecord};
use crate::domain::foundation::{AccountId, DomainError, Timestamp};

/// Result of an optimistic commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Written; the record now carries `version`.
    Committed { version: i64 },
    /// The stored version no longer matched. Nothing was written.
    VersionConflict,
    /// The event marker is no longer pending under this claim. Nothing was written.
    ClaimLost,
}

/// Port for subscription records and their transactional commit.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Loads the record for an account. `None` means the account is unknown.
    async fn get_subscription(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Resolves the account owning a provider subscription id.
    async fn find_account_by_provider_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountId>, DomainError>;

    /// Resolves the account owning a provider customer id.
    async fn find_account_by_provider_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountId>, DomainError>;

    /// Atomically applies a computed transition.
    ///
    /// Compare-and-swap on `version`: the write succeeds only if the stored
    /// record is still at `expected_version`, and then stores
    /// `expected_version + 1`. In the same unit it appends `ledger` and marks
    /// the claimed event marker as applied; if that marker is no longer
    /// pending under `claim` the whole unit is abandoned with `ClaimLost`.
    /// Any failure leaves all three untouched.
    async fn commit_transition(
        &self,
        expected_version: i64,
        next: &SubscriptionRecord,
        ledger: &[LedgerEntry],
        claim: &MarkerClaim,
    ) -> Result<CommitResult, DomainError>;

    /// Creates the initial record for a new account.
    ///
    /// Called by the signup flow. Fails with `AccountAlreadyExists` if a
    /// record is present.
    async fn open_account(
        &self,
        account_id: &AccountId,
        now: Timestamp,
    ) -> Result<SubscriptionRecord, DomainError>;
}
