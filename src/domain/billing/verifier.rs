//! Webhook signature verification.
//!
//! HMAC-SHA256 over `"{t}." || body`, compared in constant time, with a
//! timestamp window against replays. Verification is pure: it reads no
//! storage and takes the current time as an argument.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

use super::event::VerifiedEvent;
use super::WebhookError;

/// Default maximum age of a signed timestamp (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Default allowance for a sender clock running ahead of ours (1 minute).
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the provider signed.
    pub timestamp: i64,
    /// Every v1 signature present. More than one appears while a secret rotates.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>[,v1=<signature>...][,v0=<legacy>]`
    ///
    /// Unknown keys and legacy `v0` entries are ignored.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        if header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value.trim()).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Accepted distance between the signed timestamp and now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    pub max_age_secs: i64,
    pub clock_skew_secs: i64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_TOLERANCE_SECS,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }
}

/// Verifier for provider webhook signatures.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance: Tolerance,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, tolerance: Tolerance) -> Self {
        Self { secret, tolerance }
    }

    /// Verifies the signature and resolves the event.
    ///
    /// # Verification Steps
    ///
    /// 1. Parse the signature header
    /// 2. Check the signed timestamp against the tolerance window
    /// 3. Compute the expected HMAC over the raw bytes
    /// 4. Compare against every v1 signature in constant time
    /// 5. Parse the envelope and resolve the event kind
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<VerifiedEvent, WebhookError> {
        self.verify_signature(payload, signature_header, now)?;
        VerifiedEvent::from_slice(payload)
    }

    /// Steps 1-4 of [`verify`](Self::verify), without parsing the body.
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.validate_timestamp(header.timestamp, now)?;

        let expected = compute_signature(&self.secret, header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    fn validate_timestamp(&self, timestamp: i64, now: Timestamp) -> Result<(), WebhookError> {
        // The header is unauthenticated here; extreme values must not overflow
        let age = now
            .as_unix_secs()
            .checked_sub(timestamp)
            .ok_or(WebhookError::InvalidTimestamp)?;

        if age > self.tolerance.max_age_secs {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -self.tolerance.clock_skew_secs {
            return Err(WebhookError::InvalidTimestamp);
        }
        Ok(())
    }
}

/// Builds a valid signature header for `payload` signed at `timestamp`.
///
/// Used by fixtures and local replay tooling.
pub fn sign_payload(secret: &SecretString, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

fn compute_signature(
    secret: &SecretString,
    timestamp: i64,
    payload: &[u8],
) -> Result<Vec<u8>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison; lengths may leak, contents do not.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
