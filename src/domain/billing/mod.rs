//! Billing domain module.
//!
//! Webhook verification, event resolution, and the pure subscription
//! transitions that reconcile an account with its payment provider.
//!
//! # Module Structure
//!
//! - `verifier` - Signature and timestamp checks over the raw body
//! - `event` - Envelope parsing into the closed `BillingEvent` variant
//! - `subscription` - Per-account subscription record and invariants
//! - `ledger` - Append-only payment entries and their summary fold
//! - `marker` - Processed event markers (idempotency guard state)
//! - `transitions` - One pure function per event kind

mod errors;
mod event;
mod ledger;
mod marker;
mod status;
mod subscription;
pub mod transitions;
mod verifier;

pub use errors::WebhookError;
pub use event::{AccountRef, BillingAction, BillingEvent, ProviderEvent, ProviderEventData, VerifiedEvent};
pub use ledger::{Charge, LedgerEntry, LedgerSummary, PaymentOutcome};
pub use marker::{MarkerClaim, MarkerOutcome, ProcessedEventMarker};
pub use status::SubscriptionStatus;
pub use subscription::{BillingPeriod, SubscriptionRecord};
pub use transitions::{Transition, TransitionContext, TransitionSummary};
pub use verifier::{
    sign_payload, SignatureHeader, Tolerance, WebhookVerifier, DEFAULT_CLOCK_SKEW_SECS,
    DEFAULT_TOLERANCE_SECS,
};
