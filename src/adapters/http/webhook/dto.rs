//! Response bodies for the webhook endpoint.

use serde::{Deserialize, Serialize};

use crate::application::ReconcileOutcome;

/// Acknowledgment returned with `200 OK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    /// One of `applied`, `duplicate`, `ignored`.
    pub outcome: String,
    pub event_id: String,
}

impl From<&ReconcileOutcome> for WebhookAckResponse {
    fn from(outcome: &ReconcileOutcome) -> Self {
        Self {
            received: true,
            outcome: outcome.as_str().to_string(),
            event_id: outcome.event_id().to_string(),
        }
    }
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EventId;

    #[test]
    fn ack_serializes_outcome_and_event_id() {
        let outcome = ReconcileOutcome::Duplicate {
            event_id: EventId::new("evt_9").unwrap(),
        };

        let json = serde_json::to_value(WebhookAckResponse::from(&outcome)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"received": true, "outcome": "duplicate", "event_id": "evt_9"})
        );
    }

    #[test]
    fn error_response_uses_error_and_message_keys() {
        let json = serde_json::to_value(ErrorResponse::new("INVALID_SIGNATURE", "Invalid signature"))
            .unwrap();

        assert_eq!(json["error"], "INVALID_SIGNATURE");
        assert_eq!(json["message"], "Invalid signature");
    }
}
