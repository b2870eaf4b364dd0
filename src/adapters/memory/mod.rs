//! In-memory adapters for tests and local runs.

mod billing_store;

pub use billing_store::InMemoryBillingStore;
