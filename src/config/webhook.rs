//! Webhook reconciliation configuration

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Webhook verification and reconciliation settings
#[derive(Deserialize)]
pub struct WebhookConfig {
    /// Provider webhook signing secret (`whsec_...`)
    pub signing_secret: SecretString,

    /// Maximum age of a signed timestamp, in seconds
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: i64,

    /// Allowed clock skew for future timestamps, in seconds
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,

    /// Deadline for all storage work of one delivery, in milliseconds
    #[serde(default = "default_storage_deadline")]
    pub storage_deadline_ms: u64,

    /// Commit attempts before a version conflict is surfaced
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,

    /// How long an in-flight delivery holds its event id, in seconds
    #[serde(default = "default_admission_lease")]
    pub admission_lease_secs: i64,

    /// Entitlement window granted when the provider sends none, in days
    #[serde(default = "default_billing_interval")]
    pub billing_interval_days: i64,

    /// Age after which rejected event markers are pruned, in days
    #[serde(default = "default_marker_retention")]
    pub marker_retention_days: i64,

    /// Interval between prune runs, in seconds
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl WebhookConfig {
    pub const DEFAULT_STORAGE_DEADLINE_MS: u64 = 5_000;

    pub fn storage_deadline(&self) -> Duration {
        Duration::from_millis(self.storage_deadline_ms)
    }

    pub fn admission_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.admission_lease_secs)
    }

    pub fn billing_interval(&self) -> chrono::Duration {
        chrono::Duration::days(self.billing_interval_days)
    }

    pub fn marker_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.marker_retention_days)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.signing_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("WEBHOOK_SIGNING_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }

        let positive = [
            ("webhook.tolerance_secs", self.tolerance_secs > 0),
            ("webhook.storage_deadline_ms", self.storage_deadline_ms > 0),
            ("webhook.max_commit_attempts", self.max_commit_attempts > 0),
            ("webhook.admission_lease_secs", self.admission_lease_secs > 0),
            ("webhook.billing_interval_days", self.billing_interval_days > 0),
            ("webhook.marker_retention_days", self.marker_retention_days > 0),
            ("webhook.prune_interval_secs", self.prune_interval_secs > 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, ok)| !ok) {
            return Err(ValidationError::MustBePositive(*field));
        }

        // A delivery holds its marker for the deadline plus the bounded
        // reject that follows it; the lease must outlast both.
        let lease_ms = u64::try_from(self.admission_lease_secs)
            .unwrap_or(0)
            .saturating_mul(1_000);
        if lease_ms <= self.storage_deadline_ms.saturating_mul(2) {
            return Err(ValidationError::LeaseWithinDeadline);
        }

        Ok(())
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("signing_secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("storage_deadline_ms", &self.storage_deadline_ms)
            .field("max_commit_attempts", &self.max_commit_attempts)
            .field("admission_lease_secs", &self.admission_lease_secs)
            .field("billing_interval_days", &self.billing_interval_days)
            .field("marker_retention_days", &self.marker_retention_days)
            .field("prune_interval_secs", &self.prune_interval_secs)
            .finish()
    }
}

fn default_tolerance() -> i64 {
    300
}

fn default_clock_skew() -> i64 {
    60
}

fn default_storage_deadline() -> u64 {
    WebhookConfig::DEFAULT_STORAGE_DEADLINE_MS
}

fn default_max_commit_attempts() -> u32 {
    3
}

fn default_admission_lease() -> i64 {
    300
}

fn default_billing_interval() -> i64 {
    30
}

fn default_marker_retention() -> i64 {
    30
}

fn default_prune_interval() -> u64 {
    3_600
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> WebhookConfig {
        WebhookConfig {
            signing_secret: SecretString::new(secret.to_string()),
            tolerance_secs: default_tolerance(),
            clock_skew_secs: default_clock_skew(),
            storage_deadline_ms: default_storage_deadline(),
            max_commit_attempts: default_max_commit_attempts(),
            admission_lease_secs: default_admission_lease(),
            billing_interval_days: default_billing_interval(),
            marker_retention_days: default_marker_retention(),
            prune_interval_secs: default_prune_interval(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config("whsec_abc").validate().is_ok());
    }

    #[test]
    fn test_empty_secret_is_missing() {
        assert_eq!(
            config("").validate(),
            Err(ValidationError::MissingRequired("WEBHOOK_SIGNING_SECRET"))
        );
    }

    #[test]
    fn test_secret_requires_prefix() {
        assert_eq!(
            config("sk_test_abc").validate(),
            Err(ValidationError::InvalidWebhookSecret)
        );
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let mut c = config("whsec_abc");
        c.storage_deadline_ms = 0;
        assert_eq!(
            c.validate(),
            Err(ValidationError::MustBePositive("webhook.storage_deadline_ms"))
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut c = config("whsec_abc");
        c.max_commit_attempts = 0;
        assert_eq!(
            c.validate(),
            Err(ValidationError::MustBePositive("webhook.max_commit_attempts"))
        );
    }

    #[test]
    fn test_lease_must_outlast_deadline_and_reject() {
        let mut c = config("whsec_abc");
        c.storage_deadline_ms = 5_000;
        c.admission_lease_secs = 10;
        assert_eq!(c.validate(), Err(ValidationError::LeaseWithinDeadline));

        c.admission_lease_secs = 11;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config("whsec_supersecret"));
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_duration_accessors() {
        let c = config("whsec_abc");
        assert_eq!(c.storage_deadline(), Duration::from_secs(5));
        assert_eq!(c.admission_lease(), chrono::Duration::minutes(5));
        assert_eq!(c.billing_interval(), chrono::Duration::days(30));
        assert_eq!(c.prune_interval(), Duration::from_secs(3_600));
    }
}
