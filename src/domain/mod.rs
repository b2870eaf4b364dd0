//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `billing` - Webhook verification, event resolution, and subscription transitions

pub mod billing;
pub mod foundation;
