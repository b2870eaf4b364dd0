//! Billing Reconciler - subscription webhook reconciliation.
//!
//! Applies signed, at-least-once provider notifications to per-account
//! subscription records and an append-only payment ledger, exactly once in
//! effect, under replay, reordering, and concurrent delivery.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
