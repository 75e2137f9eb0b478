//! Inventory locks: per-order provisional holds on product units.

use serde::Serialize;
use sqlx::FromRow;
use wq_core::status::{LockStatus, StatusId};
use wq_core::types::{DbId, Timestamp};

use super::decode_status;
use crate::error::StoreError;

/// A row from the `inventory_locks` table.
///
/// `order_id` is NULL between insert and the owning order's creation; both
/// happen inside the same transaction so no other reader sees it NULL.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InventoryLock {
    pub id: DbId,
    pub product_id: DbId,
    pub order_id: Option<DbId>,
    pub quantity: i32,
    /// Absolute expiry, epoch seconds.
    pub expire_time: i64,
    pub status_id: StatusId,
    pub created_at: Timestamp,
}

impl InventoryLock {
    pub fn status(&self) -> Result<LockStatus, StoreError> {
        decode_status("inventory_locks", self.id, self.status_id, LockStatus::from_id)
    }

    /// Counts against availability at `now_epoch`.
    pub fn is_active(&self, now_epoch: i64) -> bool {
        self.status_id == LockStatus::Locked.id() && self.expire_time > now_epoch
    }
}

/// DTO for inserting a lock. Locks are always created in `locked` status.
#[derive(Debug, Clone)]
pub struct CreateInventoryLock {
    pub product_id: DbId,
    pub quantity: i32,
    pub expire_time: i64,
    pub created_at: Timestamp,
}
