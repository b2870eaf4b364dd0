//! LedgerReader port - read side of the payment ledger.
//!
//! Entries are appended only through `SubscriptionStore::commit_transition`.

use async_trait::async_trait;

use crate::domain::billing::{LedgerEntry, LedgerSummary};
use crate::domain::foundation::{AccountId, DomainError};

#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// All entries for an account, oldest `occurred_at` first.
    async fn entries_for(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, DomainError>;

    /// Summary fold over the account's entries.
    async fn summary_for(&self, account_id: &AccountId) -> Result<LedgerSummary, DomainError> {
        let entries = self.entries_for(account_id).await?;
        Ok(LedgerSummary::fold(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_reader_is_object_safe() {
        fn _accepts_dyn(_reader: &dyn LedgerReader) {}
    }
}
