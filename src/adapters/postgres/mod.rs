//! PostgreSQL adapters - Database implementations for the billing ports.
//!
//! - `PostgresSubscriptionStore` - Subscription records, the transactional
//!   commit, and ledger reads
//! - `PostgresEventMarkerStore` - Processed event markers

mod event_marker_store;
mod subscription_store;

pub use event_marker_store::PostgresEventMarkerStore;
pub use subscription_store::PostgresSubscriptionStore;
