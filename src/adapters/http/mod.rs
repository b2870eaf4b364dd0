//! HTTP adapters - Axum endpoint exposure.

pub mod webhook;

pub use webhook::{webhook_router, WebhookAppState};
