//! HTTP handlers for webhook deliveries.
//!
//! These handlers connect Axum routes to the reconciliation unit of work.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::{ReconcileWebhookCommand, ReconcileWebhookHandler};
use crate::domain::billing::WebhookError;

use super::dto::{ErrorResponse, WebhookAckResponse};

/// Header carrying `t=<unix>,v1=<hex>[,v1=<hex>...]`.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookAppState {
    pub reconciler: Arc<ReconcileWebhookHandler>,
}

impl WebhookAppState {
    pub fn new(reconciler: Arc<ReconcileWebhookHandler>) -> Self {
        Self { reconciler }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handler
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhook - Verify and reconcile a provider event.
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn receive_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ReconcileWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let outcome = state.reconciler.handle(cmd).await?;

    Ok((StatusCode::OK, Json(WebhookAckResponse::from(&outcome))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts webhook errors to HTTP responses.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        // Storage and parser details stay in the logs
        let message = match &self.0 {
            err if err.is_retryable() => "Event could not be processed; retry later".to_string(),
            WebhookError::ParseError(_) => "Malformed event payload".to_string(),
            err => err.to_string(),
        };
        let body = ErrorResponse::new(self.0.code(), message);
        (status, Json(body)).into_response()
    }
}
