//! Human-facing order numbers.
//!
//! Format: `<prefix><epoch millis><8 uppercase hex>`. The random suffix keeps
//! numbers unique when two holds are created in the same millisecond; the
//! storage layer still enforces uniqueness with a constraint.

use uuid::Uuid;

use crate::types::Timestamp;

/// Prefix for activity registration order numbers.
pub const REGISTRATION_PREFIX: &str = "ACT";

/// Prefix for mall order numbers.
pub const ORDER_PREFIX: &str = "ORD";

/// Generate an order number stamped with `at`.
pub fn generate(prefix: &str, at: Timestamp) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}{}{}",
        at.timestamp_millis(),
        suffix[..8].to_ascii_uppercase()
    )
}
