//! Status enums and transition tables for every hold-bearing entity.
//!
//! Each enum variant's discriminant is the SMALLINT code stored in the
//! database. Transitions are looked up in one place per entity instead of
//! comparing integer codes at call sites.

use crate::error::{ConflictKind, CoreError};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Parse a database status ID. `None` for unknown codes.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase name used in logs and error messages.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Activity registration window status.
    ActivityStatus {
        Registering = 0 => "registering",
        Closed = 1 => "closed",
        Ended = 2 => "ended",
    }
}

define_status_enum! {
    /// Registration (seat hold) status.
    RegistrationStatus {
        Registered = 0 => "registered",
        Cancelled = 1 => "cancelled",
        CheckedIn = 2 => "checked_in",
    }
}

define_status_enum! {
    /// Payment status carried by a registration.
    PaymentStatus {
        Unpaid = 0 => "unpaid",
        Paid = 1 => "paid",
        Refunded = 2 => "refunded",
    }
}

define_status_enum! {
    /// Mall order status.
    OrderStatus {
        Pending = 0 => "pending",
        Paid = 1 => "paid",
        Shipped = 2 => "shipped",
        Completed = 3 => "completed",
        Cancelled = 4 => "cancelled",
    }
}

define_status_enum! {
    /// Inventory lock row status.
    LockStatus {
        Released = 0 => "released",
        Locked = 1 => "locked",
    }
}

// ---------------------------------------------------------------------------
// Registration state machine
// ---------------------------------------------------------------------------

/// Events that move a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    ConfirmPayment,
    Cancel,
    CheckIn,
}

impl RegistrationEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::ConfirmPayment => "confirm payment for",
            Self::Cancel => "cancel",
            Self::CheckIn => "check in",
        }
    }
}

/// Resolve `(status, payment) × event` to the next state.
///
/// | from                    | event          | to                     |
/// |-------------------------|----------------|------------------------|
/// | registered, unpaid      | confirm payment| registered, paid       |
/// | registered, any payment | cancel         | cancelled, unchanged   |
/// | registered, paid        | check in       | checked_in, paid       |
///
/// Everything else is rejected with [`ConflictKind::InvalidTransition`].
pub fn registration_transition(
    status: RegistrationStatus,
    payment: PaymentStatus,
    event: RegistrationEvent,
) -> Result<(RegistrationStatus, PaymentStatus), CoreError> {
    use PaymentStatus as P;
    use RegistrationEvent as E;
    use RegistrationStatus as R;

    match (status, payment, event) {
        (R::Registered, P::Unpaid, E::ConfirmPayment) => Ok((R::Registered, P::Paid)),
        (R::Registered, p @ (P::Unpaid | P::Paid), E::Cancel) => Ok((R::Cancelled, p)),
        (R::Registered, P::Paid, E::CheckIn) => Ok((R::CheckedIn, P::Paid)),
        _ => {
            // Surface the payment state when the registration itself is
            // still open, since that is what blocked the event.
            let from = if status == R::Registered {
                payment.name()
            } else {
                status.name()
            };
            Err(CoreError::Conflict(ConflictKind::InvalidTransition {
                entity: "registration",
                from,
                event: event.name(),
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Order state machine
// ---------------------------------------------------------------------------

/// Events that move an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    Pay,
    Ship,
    Complete,
    Cancel,
}

impl OrderEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pay => "pay",
            Self::Ship => "ship",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

/// Resolve `status × event` to the next order status.
///
/// `pending → paid → shipped → completed`, or `pending → cancelled`.
pub fn order_transition(status: OrderStatus, event: OrderEvent) -> Result<OrderStatus, CoreError> {
    use OrderEvent as E;
    use OrderStatus as S;

    match (status, event) {
        (S::Pending, E::Pay) => Ok(S::Paid),
        (S::Pending, E::Cancel) => Ok(S::Cancelled),
        (S::Paid, E::Ship) => Ok(S::Shipped),
        (S::Shipped, E::Complete) => Ok(S::Completed),
        _ => Err(CoreError::Conflict(ConflictKind::InvalidTransition {
            entity: "order",
            from: status.name(),
            event: event.name(),
        })),
    }
}

impl OrderStatus {
    /// No further transition is defined.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl RegistrationStatus {
    /// No further transition is defined.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::CheckedIn)
    }
}
