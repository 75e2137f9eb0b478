use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Rate limited: {key}")]
    RateLimited { key: String },

    #[error("Integrity check failed: {0}")]
    Integrity(IntegrityViolation),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a lookup by primary key that found nothing.
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound {
            entity,
            key: format!("with id {id}"),
        }
    }

    /// Shorthand for a lookup by a secondary key (order number, user pair).
    pub fn not_found_by(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }
}

/// Business-rule conflicts. The caller may re-read state and retry; the
/// engine never retries these on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictKind {
    /// The activity is not accepting registrations.
    #[error("activity is not open for registration")]
    NotRegistering,
    /// The activity's registration deadline has passed.
    #[error("registration deadline has passed")]
    DeadlinePassed,
    /// No seats left (either at check time or lost to a concurrent CAS).
    #[error("activity is full")]
    CapacityFull,
    /// The user already holds a non-cancelled registration.
    #[error("user is already registered")]
    DuplicateRegistration,
    /// Requested quantity exceeds what is not already spoken for.
    #[error("insufficient stock for product {product_id} (available: {available})")]
    InsufficientStock { product_id: DbId, available: i64 },
    /// The status machine has no edge for this event.
    #[error("cannot {event} {entity} in status '{from}'")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        event: &'static str,
    },
    /// The hold's deadline passed; it has been (or will be) cancelled.
    #[error("{entity} has expired")]
    Expired { entity: &'static str },
}

/// Why an amount signature was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityViolation {
    /// No signature was supplied.
    #[error("signature missing")]
    Missing,
    /// The timestamp is outside the anti-replay window.
    #[error("signature timestamp outside tolerance window")]
    Stale,
    /// The recomputed signature does not match.
    #[error("signature mismatch")]
    Mismatch,
}
