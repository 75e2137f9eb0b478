//! Registrations: seat holds against an activity.

use serde::Serialize;
use sqlx::FromRow;
use wq_core::status::{PaymentStatus, RegistrationStatus, StatusId};
use wq_core::types::{DbId, Money, Timestamp};

use super::decode_status;
use crate::error::StoreError;

/// Partial unique index on `(activity_id, user_id)` for non-cancelled rows.
pub const UQ_ACTIVE_REGISTRATION: &str = "uq_registrations_active";

/// Unique index on `order_no`.
pub const UQ_REGISTRATION_ORDER_NO: &str = "uq_registrations_order_no";

/// A row from the `registrations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Registration {
    pub id: DbId,
    pub activity_id: DbId,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: Option<String>,
    pub remarks: Option<String>,
    pub status_id: StatusId,
    pub payment_status_id: StatusId,
    pub payment_amount: Money,
    pub payment_time: Option<Timestamp>,
    pub payment_expire_time: Option<Timestamp>,
    pub order_no: String,
    pub cancel_time: Option<Timestamp>,
    pub cancel_reason: Option<String>,
    pub created_at: Timestamp,
}

impl Registration {
    pub fn status(&self) -> Result<RegistrationStatus, StoreError> {
        decode_status(
            "registrations",
            self.id,
            self.status_id,
            RegistrationStatus::from_id,
        )
    }

    pub fn payment_status(&self) -> Result<PaymentStatus, StoreError> {
        decode_status(
            "registrations",
            self.id,
            self.payment_status_id,
            PaymentStatus::from_id,
        )
    }

    /// True once `now` is past the payment window (if one was set).
    pub fn payment_expired(&self, now: Timestamp) -> bool {
        self.payment_expire_time.is_some_and(|deadline| deadline < now)
    }
}

/// DTO for inserting a registration at reservation time.
#[derive(Debug, Clone)]
pub struct CreateRegistration {
    pub activity_id: DbId,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: Option<String>,
    pub remarks: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_amount: Money,
    pub payment_time: Option<Timestamp>,
    pub payment_expire_time: Option<Timestamp>,
    pub order_no: String,
    pub created_at: Timestamp,
}
