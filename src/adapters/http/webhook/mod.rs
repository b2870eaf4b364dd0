//! HTTP adapter for provider webhook deliveries.
//!
//! - `POST /webhook` - Verify and reconcile a signed provider event

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{WebhookApiError, WebhookAppState};
pub use routes::{webhook_router, webhook_routes, DEFAULT_BODY_LIMIT_BYTES};
