//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Billing Ports
//!
//! - `EventMarkerStore` - Idempotency guard over provider event ids
//! - `SubscriptionStore` - Per-account records and the transactional commit
//! - `LedgerReader` - Read side of the append-only payment ledger

mod event_marker_store;
mod ledger_reader;
mod subscription_store;

pub use event_marker_store::{Admission, EventMarkerStore};
pub use ledger_reader::LedgerReader;
pub use subscription_store::{CommitResult, SubscriptionStore};
