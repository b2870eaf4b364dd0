//! Billing handlers.
//!
//! ## Commands
//! - Reconciling a provider webhook delivery
//! - Pruning settled processed-event markers

mod prune_processed_events;
mod reconcile_webhook;

pub use prune_processed_events::PruneProcessedEventsHandler;
pub use reconcile_webhook::{
    ReconcileOutcome, ReconcileSettings, ReconcileWebhookCommand, ReconcileWebhookHandler,
};
