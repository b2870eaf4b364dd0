//! Webhook error types for billing event reconciliation.
//!
//! Every failure a delivery can hit, with the HTTP status the provider sees
//! and whether a redelivery may succeed.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors that occur while verifying or applying a webhook delivery.
///
/// Duplicates and unknown event kinds are acknowledged outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// The signature header was absent from the request.
    #[error("Missing signature header")]
    MissingSignature,

    /// No signature in the header matched the payload under the secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Signature header or payload could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A field the event kind requires was absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Provider reported a subscription status with no local counterpart.
    #[error("Unrecognised provider status: {0}")]
    InvalidStateMapping(String),

    /// The computed next record broke a record invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The event referenced an account this service does not know yet.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Optimistic commit lost the race on every attempt.
    #[error("Storage conflict after {attempts} attempts")]
    StorageConflict { attempts: u32 },

    /// Storage rejected or failed the operation.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Storage I/O did not finish within the delivery deadline.
    #[error("Storage deadline exceeded")]
    StorageTimeout,

    /// Another delivery holds the event marker, or took it over.
    #[error("Event is being processed by another delivery")]
    EventInFlight,
}

impl WebhookError {
    /// Returns true if the provider should redeliver this event.
    ///
    /// Retryable errors are transient: contention, storage outages, or an
    /// account the signup flow has not committed yet.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::AccountNotFound(_)
                | WebhookError::StorageConflict { .. }
                | WebhookError::StorageUnavailable(_)
                | WebhookError::StorageTimeout
                | WebhookError::EventInFlight
        )
    }

    /// Maps the error to the HTTP status code returned to the provider.
    ///
    /// - 4xx: the payload itself is bad, redelivery cannot help
    /// - 5xx: transient, the provider will redeliver
    pub fn status_code(&self) -> StatusCode {
        if self.is_retryable() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::MissingField(_) => "MISSING_FIELD",
            WebhookError::InvalidStateMapping(_) => "INVALID_STATE_MAPPING",
            WebhookError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            WebhookError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WebhookError::StorageConflict { .. } => "STORAGE_CONFLICT",
            WebhookError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            WebhookError::StorageTimeout => "STORAGE_TIMEOUT",
            WebhookError::EventInFlight => "EVENT_IN_FLIGHT",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::Timeout => WebhookError::StorageTimeout,
            ErrorCode::AccountNotFound => WebhookError::AccountNotFound(err.message),
            _ => WebhookError::StorageUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Error Display Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn invalid_state_mapping_names_provider_status() {
        let err = WebhookError::InvalidStateMapping("frozen".to_string());
        assert_eq!(format!("{}", err), "Unrecognised provider status: frozen");
    }

    #[test]
    fn storage_conflict_reports_attempts() {
        let err = WebhookError::StorageConflict { attempts: 3 };
        assert_eq!(format!("{}", err), "Storage conflict after 3 attempts");
    }

    #[test]
    fn missing_field_displays_field_name() {
        let err = WebhookError::MissingField("client_reference_id");
        assert_eq!(format!("{}", err), "Missing field: client_reference_id");
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verification_failures_are_bad_request() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
            WebhookError::InvalidTimestamp,
            WebhookError::ParseError("bad json".to_string()),
            WebhookError::MissingField("id"),
            WebhookError::InvalidStateMapping("frozen".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{}", err);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn invariant_violation_is_bad_request() {
        let err = WebhookError::InvariantViolation("active without period".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn storage_failures_are_server_errors() {
        for err in [
            WebhookError::AccountNotFound("acct-1".to_string()),
            WebhookError::StorageConflict { attempts: 3 },
            WebhookError::StorageUnavailable("pool closed".to_string()),
            WebhookError::StorageTimeout,
            WebhookError::EventInFlight,
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{}", err);
            assert!(err.is_retryable());
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Conversion Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn domain_timeout_becomes_storage_timeout() {
        let err: WebhookError = DomainError::new(ErrorCode::Timeout, "slow").into();
        assert_eq!(err, WebhookError::StorageTimeout);
    }

    #[test]
    fn domain_database_error_becomes_storage_unavailable() {
        let err: WebhookError =
            DomainError::new(ErrorCode::DatabaseError, "connection refused").into();
        assert!(matches!(err, WebhookError::StorageUnavailable(msg) if msg.contains("connection refused")));
    }
}
