use wq_core::error::{ConflictKind, CoreError};
use wq_core::payment::PaymentError;
use wq_db::StoreError;

/// Coarse classification a caller can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Integrity,
    RateLimited,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl LifecycleError {
    pub fn conflict(kind: ConflictKind) -> Self {
        Self::Core(CoreError::Conflict(kind))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(CoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Core(CoreError::Conflict(_)) => ErrorKind::Conflict,
            Self::Core(CoreError::Validation(_)) => ErrorKind::Validation,
            Self::Core(CoreError::Integrity(_)) => ErrorKind::Integrity,
            Self::Core(CoreError::RateLimited { .. }) => ErrorKind::RateLimited,
            Self::Core(CoreError::Internal(_)) | Self::Store(_) | Self::Payment(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Infrastructure failures abort the request; everything else is a
    /// caller-facing answer.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    /// The conflict detail, if this is a business-rule conflict.
    pub fn as_conflict(&self) -> Option<&ConflictKind> {
        match self {
            Self::Core(CoreError::Conflict(kind)) => Some(kind),
            _ => None,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A conditional update that matched nothing means the row moved on under us.
pub(crate) fn ensure_moved(
    rows: u64,
    entity: &'static str,
    from: &'static str,
    event: &'static str,
) -> LifecycleResult<()> {
    if rows == 0 {
        return Err(LifecycleError::conflict(ConflictKind::InvalidTransition {
            entity,
            from,
            event,
        }));
    }
    Ok(())
}
