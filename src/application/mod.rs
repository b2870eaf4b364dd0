//! Application layer - command handlers.
//!
//! Orchestrates domain transitions and coordinates between ports.

pub mod handlers;

pub use handlers::billing::{
    PruneProcessedEventsHandler, ReconcileOutcome, ReconcileSettings, ReconcileWebhookCommand,
    ReconcileWebhookHandler,
};
