//! PostgreSQL implementation of EventMarkerStore.
//!
//! Admission is one conditional upsert on the `processed_events` primary key,
//! so two concurrent deliveries of an id can never both be admitted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{MarkerClaim, MarkerOutcome, ProcessedEventMarker};
use crate::domain::foundation::{DomainError, ErrorCode, EventId, Timestamp};
use crate::ports::{Admission, EventMarkerStore};

/// PostgreSQL implementation of the EventMarkerStore port.
pub struct PostgresEventMarkerStore {
    pool: PgPool,
}

impl PostgresEventMarkerStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MarkerRow {
    event_id: String,
    event_kind: String,
    received_at: DateTime<Utc>,
    outcome: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MarkerRow> for ProcessedEventMarker {
    type Error = DomainError;

    fn try_from(row: MarkerRow) -> Result<Self, Self::Error> {
        let outcome: MarkerOutcome = row.outcome.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid outcome value: {}", e))
        })?;

        Ok(ProcessedEventMarker {
            event_id: EventId::new(row.event_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid event_id: {}", e))
            })?,
            event_kind: row.event_kind,
            received_at: Timestamp::from_datetime(row.received_at),
            outcome,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl EventMarkerStore for PostgresEventMarkerStore {
    async fn admit(
        &self,
        event_id: &EventId,
        event_kind: &str,
        now: Timestamp,
        lease_expired_before: Timestamp,
    ) -> Result<Admission, DomainError> {
        // The row is returned only when this statement inserted it or took
        // over a rejected / abandoned marker.
        let admitted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO processed_events (event_id, event_kind, received_at, outcome, updated_at)
            VALUES ($1, $2, $3, 'pending', $3)
            ON CONFLICT (event_id) DO UPDATE SET
                outcome = 'pending',
                event_kind = EXCLUDED.event_kind,
                received_at = EXCLUDED.received_at,
                updated_at = EXCLUDED.updated_at
            WHERE processed_events.outcome = 'rejected'
               OR (processed_events.outcome = 'pending' AND processed_events.received_at < $4)
            RETURNING event_id
            "#,
        )
        .bind(event_id.as_str())
        .bind(event_kind)
        .bind(now.as_datetime())
        .bind(lease_expired_before.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to admit event: {}", e))
        })?;

        Ok(match admitted {
            Some(_) => Admission::Admitted,
            None => Admission::Duplicate,
        })
    }

    async fn mark_outcome(
        &self,
        claim: &MarkerClaim,
        outcome: MarkerOutcome,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE processed_events SET outcome = $3, updated_at = $4
            WHERE event_id = $1 AND outcome = 'pending' AND received_at = $2
            "#,
        )
        .bind(claim.event_id.as_str())
        .bind(claim.admitted_at.as_datetime())
        .bind(outcome.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to mark event: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<ProcessedEventMarker>, DomainError> {
        let row: Option<MarkerRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_kind, received_at, outcome, updated_at
            FROM processed_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to fetch marker: {}", e))
        })?;

        row.map(ProcessedEventMarker::try_from).transpose()
    }

    async fn delete_rejected_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM processed_events WHERE received_at < $1 AND outcome = 'rejected'",
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to prune markers: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_row_converts_to_marker() {
        let now = Utc::now();
        let marker = ProcessedEventMarker::try_from(MarkerRow {
            event_id: "evt_1".to_string(),
            event_kind: "invoice.payment_failed".to_string(),
            received_at: now,
            outcome: "rejected".to_string(),
            updated_at: now,
        })
        .unwrap();
        assert_eq!(marker.outcome, MarkerOutcome::Rejected);
        assert_eq!(marker.event_kind, "invoice.payment_failed");
    }

    #[test]
    fn marker_row_with_unknown_outcome_is_database_error() {
        let now = Utc::now();
        let err = ProcessedEventMarker::try_from(MarkerRow {
            event_id: "evt_1".to_string(),
            event_kind: "x".to_string(),
            received_at: now,
            outcome: "done".to_string(),
            updated_at: now,
        })
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
