//! Application handlers.

pub mod billing;
