//! Database configuration
//!
//! Each in-flight delivery holds at most one pooled connection, for its
//! commit transaction. A delivery still waiting for a connection when its
//! storage deadline fires has already failed, so the acquire timeout is kept
//! below that deadline (checked in [`AppConfig::validate`](super::AppConfig::validate)).

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Connection pool settings for the subscription and marker stores
#[derive(Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; carries credentials, never logged
    pub url: SecretString,

    /// Upper bound on concurrently committing deliveries
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a delivery may wait for a pooled connection, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Validate database configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.expose_secret();
        if url.is_empty() {
            return Err(ValidationError::MissingRequired("database.url"));
        }
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 {
            return Err(ValidationError::MustBePositive("database.max_connections"));
        }
        if self.max_connections > 100 {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ValidationError::MustBePositive("database.acquire_timeout_ms"));
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    2_000
}
