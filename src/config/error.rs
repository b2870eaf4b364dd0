//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid log format (expected \"text\" or \"json\")")]
    InvalidLogFormat,

    #[error("Invalid request body limit")]
    InvalidBodyLimit,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid webhook signing secret format")]
    InvalidWebhookSecret,

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("webhook.admission_lease_secs must exceed twice webhook.storage_deadline_ms")]
    LeaseWithinDeadline,

    #[error("database.acquire_timeout_ms must be shorter than webhook.storage_deadline_ms")]
    AcquireTimeoutExceedsDeadline,
}
