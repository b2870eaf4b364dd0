//! Adapters - Implementations of port interfaces.
//!
//! - `http` - Axum routes for provider webhooks
//! - `postgres` - sqlx-backed stores
//! - `memory` - In-memory stores for tests and local runs

pub mod http;
pub mod memory;
pub mod postgres;

pub use memory::InMemoryBillingStore;
pub use postgres::{PostgresEventMarkerStore, PostgresSubscriptionStore};
