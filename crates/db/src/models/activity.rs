//! Activities: the seat-capacity resource.

use serde::Serialize;
use sqlx::FromRow;
use wq_core::status::{ActivityStatus, StatusId};
use wq_core::types::{DbId, Money, Timestamp};

use super::decode_status;
use crate::error::StoreError;

/// A row from the `activities` table.
///
/// `reserved` is only ever changed through the store's conditional
/// increment and floored decrement; `0 <= reserved <= capacity` holds at
/// all times (also enforced by a CHECK constraint).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Activity {
    pub id: DbId,
    pub title: String,
    pub capacity: i32,
    pub reserved: i32,
    pub status_id: StatusId,
    pub registration_deadline: Option<Timestamp>,
    /// Zero means free.
    pub price: Money,
    pub deleted: bool,
    pub created_at: Timestamp,
}

impl Activity {
    pub fn status(&self) -> Result<ActivityStatus, StoreError> {
        decode_status("activities", self.id, self.status_id, ActivityStatus::from_id)
    }

    pub fn is_free(&self) -> bool {
        self.price <= Money::ZERO
    }

    pub fn has_free_seat(&self) -> bool {
        self.reserved < self.capacity
    }

    /// True once `now` is past the registration deadline (if any).
    pub fn deadline_passed(&self, now: Timestamp) -> bool {
        self.registration_deadline.is_some_and(|deadline| deadline < now)
    }
}

/// DTO for creating an activity. New activities always start with zero seats taken.
#[derive(Debug, Clone)]
pub struct CreateActivity {
    pub title: String,
    pub capacity: i32,
    pub status: ActivityStatus,
    pub registration_deadline: Option<Timestamp>,
    pub price: Money,
}
