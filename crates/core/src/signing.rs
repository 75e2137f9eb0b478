//! Tamper-evident signature over a monetary commitment.
//!
//! The signature covers `(resource id, amount, timestamp)` plus a shared
//! secret salt. Parameters are concatenated in key-sorted order so the
//! signature does not depend on how the caller assembled them. Verification
//! recomputes the digest and rejects timestamps outside the tolerance
//! window (anti-replay).
//!
//! This is a defense-in-depth check. Order totals are always recomputed
//! server-side from stored prices regardless of what the client sends.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, IntegrityViolation};
use crate::types::{DbId, Money, Timestamp};

/// Default anti-replay window.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// What the client echoes back when confirming a signed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAmount {
    pub resource_id: DbId,
    pub amount: Money,
    /// Milliseconds since the Unix epoch at signing time.
    pub timestamp: i64,
    pub signature: String,
}

/// Computes and verifies amount signatures with an externally configured secret.
#[derive(Clone)]
pub struct AmountSigner {
    secret: String,
    tolerance: Duration,
}

impl fmt::Debug for AmountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmountSigner")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl AmountSigner {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Compute the hex signature for `(resource_id, amount, timestamp_ms)`.
    pub fn sign(&self, resource_id: DbId, amount: Money, timestamp_ms: i64) -> String {
        let mut params = BTreeMap::new();
        params.insert("amount", format_amount(amount));
        params.insert("resourceId", resource_id.to_string());
        params.insert("salt", self.secret.clone());
        params.insert("timestamp", timestamp_ms.to_string());

        let canonical: String = params.into_values().collect();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{digest:x}")
    }

    /// Sign and package the result for handing to a client.
    pub fn stamp(&self, resource_id: DbId, amount: Money, at: Timestamp) -> SignedAmount {
        let timestamp = at.timestamp_millis();
        SignedAmount {
            resource_id,
            amount,
            timestamp,
            signature: self.sign(resource_id, amount, timestamp),
        }
    }

    /// Verify a signature at time `now`.
    ///
    /// Freshness is checked first so a stale-but-valid signature is
    /// reported as [`IntegrityViolation::Stale`].
    pub fn verify(&self, signed: &SignedAmount, now: Timestamp) -> Result<(), CoreError> {
        if signed.signature.is_empty() {
            return Err(CoreError::Integrity(IntegrityViolation::Missing));
        }

        let skew_ms = (now.timestamp_millis() - signed.timestamp).abs();
        if skew_ms > self.tolerance.num_milliseconds() {
            return Err(CoreError::Integrity(IntegrityViolation::Stale));
        }

        let expected = self.sign(signed.resource_id, signed.amount, signed.timestamp);
        if !constant_time_eq(expected.as_bytes(), signed.signature.as_bytes()) {
            return Err(CoreError::Integrity(IntegrityViolation::Mismatch));
        }
        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Render an amount with exactly two decimals, rounding half away from zero.
pub fn format_amount(amount: Money) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
