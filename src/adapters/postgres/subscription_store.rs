//! PostgreSQL implementation of SubscriptionStore and LedgerReader.
//!
//! `commit_transition` runs the marker claim, the record CAS, and the ledger
//! inserts in one transaction. The claim comes first so the marker row stays
//! locked until commit and no later delivery can take it over mid-flight. Dropping the transaction without
//! committing (error, or the caller's deadline cancelling the future) rolls
//! everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    LedgerEntry, MarkerClaim, PaymentOutcome, SubscriptionRecord, SubscriptionStatus,
};
use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, EventId, LedgerEntryId, Timestamp,
};
use crate::ports::{CommitResult, LedgerReader, SubscriptionStore};

/// PostgreSQL implementation of the SubscriptionStore port.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription record.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    account_id: String,
    provider_customer_id: Option<String>,
    provider_subscription_id: Option<String>,
    plan_id: Option<String>,
    status: String,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    last_applied_event_id: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
        })?;

        Ok(SubscriptionRecord {
            account_id: AccountId::new(row.account_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid account_id: {}", e))
            })?,
            provider_customer_id: row.provider_customer_id,
            provider_subscription_id: row.provider_subscription_id,
            plan_id: row.plan_id,
            status,
            period_start: row.period_start.map(Timestamp::from_datetime),
            period_end: row.period_end.map(Timestamp::from_datetime),
            last_applied_event_id: row.last_applied_event_id.and_then(|id| EventId::new(id).ok()),
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Database row representation of a ledger entry.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    account_id: String,
    plan_id: Option<String>,
    amount: i64,
    currency: String,
    occurred_at: DateTime<Utc>,
    outcome: String,
    source_event_id: String,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let outcome: PaymentOutcome = row.outcome.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid outcome value: {}", e))
        })?;

        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            account_id: AccountId::new(row.account_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid account_id: {}", e))
            })?,
            plan_id: row.plan_id,
            amount: row.amount,
            currency: row.currency,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
            outcome,
            source_event_id: EventId::new(row.source_event_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid source_event_id: {}", e))
            })?,
        })
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn get_subscription(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT account_id, provider_customer_id, provider_subscription_id, plan_id,
                   status, period_start, period_end, last_applied_event_id, version,
                   created_at, updated_at
            FROM subscriptions
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch subscription", e))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_account_by_provider_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountId>, DomainError> {
        let account: Option<String> = sqlx::query_scalar(
            "SELECT account_id FROM subscriptions WHERE provider_subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("resolve provider subscription", e))?;

        Ok(account.and_then(|id| AccountId::new(id).ok()))
    }

    async fn find_account_by_provider_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountId>, DomainError> {
        let account: Option<String> = sqlx::query_scalar(
            "SELECT account_id FROM subscriptions WHERE provider_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("resolve provider customer", e))?;

        Ok(account.and_then(|id| AccountId::new(id).ok()))
    }

    async fn commit_transition(
        &self,
        expected_version: i64,
        next: &SubscriptionRecord,
        ledger: &[LedgerEntry],
        claim: &MarkerClaim,
    ) -> Result<CommitResult, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        let finalised = sqlx::query(
            r#"
            UPDATE processed_events SET outcome = 'applied', updated_at = $3
            WHERE event_id = $1 AND outcome = 'pending' AND received_at = $2
            "#,
        )
        .bind(claim.event_id.as_str())
        .bind(claim.admitted_at.as_datetime())
        .bind(next.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("finalise event marker", e))?;

        if finalised.rows_affected() == 0 {
            return Ok(CommitResult::ClaimLost);
        }

        let new_version = expected_version + 1;
        let updated = sqlx::query(
            r#"
            UPDATE subscriptions SET
                provider_customer_id = $3,
                provider_subscription_id = $4,
                plan_id = $5,
                status = $6,
                period_start = $7,
                period_end = $8,
                last_applied_event_id = $9,
                updated_at = $10,
                version = $11
            WHERE account_id = $1 AND version = $2
            "#,
        )
        .bind(next.account_id.as_str())
        .bind(expected_version)
        .bind(&next.provider_customer_id)
        .bind(&next.provider_subscription_id)
        .bind(&next.plan_id)
        .bind(next.status.as_str())
        .bind(next.period_start.map(|t| *t.as_datetime()))
        .bind(next.period_end.map(|t| *t.as_datetime()))
        .bind(next.last_applied_event_id.as_ref().map(|id| id.as_str()))
        .bind(next.updated_at.as_datetime())
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("update subscription", e))?;

        if updated.rows_affected() == 0 {
            // Dropping tx rolls the marker update back.
            return Ok(CommitResult::VersionConflict);
        }

        for entry in ledger {
            sqlx::query(
                r#"
                INSERT INTO payment_ledger (
                    id, account_id, plan_id, amount, currency, occurred_at, outcome, source_event_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.id.as_uuid())
            .bind(entry.account_id.as_str())
            .bind(&entry.plan_id)
            .bind(entry.amount)
            .bind(&entry.currency)
            .bind(entry.occurred_at.as_datetime())
            .bind(entry.outcome.as_str())
            .bind(entry.source_event_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("append ledger entry", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit transition", e))?;

        Ok(CommitResult::Committed {
            version: new_version,
        })
    }

    async fn open_account(
        &self,
        account_id: &AccountId,
        now: Timestamp,
    ) -> Result<SubscriptionRecord, DomainError> {
        let record = SubscriptionRecord::open(account_id.clone(), now);

        sqlx::query(
            r#"
            INSERT INTO subscriptions (account_id, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.account_id.as_str())
        .bind(record.status.as_str())
        .bind(record.version)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_pkey") {
                    return DomainError::new(
                        ErrorCode::AccountAlreadyExists,
                        "Account already has a subscription record",
                    )
                    .with_detail("account_id", account_id.as_str());
                }
            }
            db_error("open account", e)
        })?;

        Ok(record)
    }
}

#[async_trait]
impl LedgerReader for PostgresSubscriptionStore {
    async fn entries_for(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, plan_id, amount, currency, occurred_at, outcome, source_event_id
            FROM payment_ledger
            WHERE account_id = $1
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch ledger", e))?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> SubscriptionRow {
        SubscriptionRow {
            account_id: "acct-1".to_string(),
            provider_customer_id: Some("cus_1".to_string()),
            provider_subscription_id: None,
            plan_id: None,
            status: status.to_string(),
            period_start: None,
            period_end: None,
            last_applied_event_id: Some("evt_1".to_string()),
            version: 7,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn subscription_row_converts_to_record() {
        let record = SubscriptionRecord::try_from(row("payment_failed")).unwrap();
        assert_eq!(record.status, SubscriptionStatus::PaymentFailed);
        assert_eq!(record.version, 7);
        assert_eq!(record.last_applied_event_id, Some(EventId::new("evt_1").unwrap()));
    }

    #[test]
    fn subscription_row_with_unknown_status_is_database_error() {
        let err = SubscriptionRecord::try_from(row("past_due")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn ledger_row_converts_to_entry() {
        let entry = LedgerEntry::try_from(LedgerRow {
            id: Uuid::new_v4(),
            account_id: "acct-1".to_string(),
            plan_id: Some("plan_basic".to_string()),
            amount: 1999,
            currency: "usd".to_string(),
            occurred_at: Utc::now(),
            outcome: "failed".to_string(),
            source_event_id: "evt_9".to_string(),
        })
        .unwrap();
        assert_eq!(entry.outcome, PaymentOutcome::Failed);
        assert_eq!(entry.amount, 1999);
    }
}
