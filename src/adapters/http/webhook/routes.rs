//! Axum router configuration for the webhook endpoint.

use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::{routing::post, Router};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{receive_webhook, WebhookAppState};

/// Default cap on webhook bodies.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 256 * 1024;

/// Create the webhook router.
///
/// # Routes
/// - `POST /webhook` - Receive a signed provider event
pub fn webhook_routes() -> Router<WebhookAppState> {
    Router::new().route("/webhook", post(receive_webhook))
}

/// Create the complete service router with state and middleware applied.
///
/// Requests get an `x-request-id` (generated when absent) that is recorded on
/// the trace span and echoed on the response.
pub fn webhook_router(state: WebhookAppState, body_limit_bytes: usize) -> Router {
    webhook_routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http-request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
