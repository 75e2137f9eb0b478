//! Input validation applied before any store mutation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Smallest quantity accepted on an order line.
pub const MIN_ITEM_QUANTITY: i32 = 1;

/// Largest quantity accepted on an order line.
pub const MAX_ITEM_QUANTITY: i32 = 999;

/// Mainland mobile numbers: 11 digits starting with 13-19.
const PHONE_PATTERN: &str = r"^1[3-9]\d{9}$";

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PHONE_PATTERN).expect("valid regex"));

/// Reject empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Validate a mobile phone number.
pub fn validate_phone(field: &str, phone: &str) -> Result<(), CoreError> {
    if PHONE_RE.is_match(phone) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} '{phone}' is not a valid phone number"
        )))
    }
}

/// Validate an order line quantity.
pub fn validate_quantity(quantity: i32) -> Result<(), CoreError> {
    if (MIN_ITEM_QUANTITY..=MAX_ITEM_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Quantity {quantity} is out of range ({MIN_ITEM_QUANTITY}-{MAX_ITEM_QUANTITY})"
        )))
    }
}
