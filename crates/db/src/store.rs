//! The Reservation Store contract.
//!
//! [`ReservationStore`] covers plain reads and the expiry scans the sweeper
//! needs. Every mutation goes through a [`StoreTx`]: a unit of work that
//! persists only on [`StoreTx::commit`] and rolls back when dropped.
//!
//! Capacity fields (`activities.reserved`, `products.stock`) have no setter
//! here. They change only through the conditional operations
//! ([`StoreTx::increment_reserved`], [`StoreTx::release_seat`],
//! [`StoreTx::consume_stock`]) whose affected-row count tells the caller
//! whether the guard held.

use async_trait::async_trait;
use wq_core::status::{OrderStatus, PaymentStatus, RegistrationStatus};
use wq_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::models::activity::Activity;
use crate::models::inventory_lock::{CreateInventoryLock, InventoryLock};
use crate::models::order::{CreateOrder, OrderWithItems};
use crate::models::product::Product;
use crate::models::registration::{CreateRegistration, Registration};

/// Optional columns written alongside a status change.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionStamp<'a> {
    pub paid_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub reason: Option<&'a str>,
}

impl<'a> TransitionStamp<'a> {
    pub fn paid(at: Timestamp) -> Self {
        Self {
            paid_at: Some(at),
            ..Self::default()
        }
    }

    pub fn cancelled(at: Timestamp, reason: Option<&'a str>) -> Self {
        Self {
            cancelled_at: Some(at),
            reason,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ReservationStore: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_activity(&self, id: DbId) -> Result<Option<Activity>, StoreError>;

    async fn find_registration(&self, id: DbId) -> Result<Option<Registration>, StoreError>;

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError>;

    async fn find_order(&self, id: DbId) -> Result<Option<OrderWithItems>, StoreError>;

    /// All orders of a user, newest first.
    async fn list_orders_by_user(&self, user_id: &str) -> Result<Vec<OrderWithItems>, StoreError>;

    /// Ids of `pending` orders created before `created_before`, oldest first.
    async fn find_expired_pending_orders(
        &self,
        created_before: Timestamp,
    ) -> Result<Vec<DbId>, StoreError>;

    /// Ids of `registered ∧ unpaid` registrations whose payment window closed before `now`.
    async fn find_expired_unpaid_registrations(
        &self,
        now: Timestamp,
    ) -> Result<Vec<DbId>, StoreError>;

    /// Bulk `registering → closed` for live activities whose deadline passed.
    /// Returns the number of activities closed.
    async fn close_expired_activities(&self, now: Timestamp) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    // ---- activities ----

    /// Locked read: blocks other transactions locking the same activity
    /// until this one ends.
    async fn lock_activity(&mut self, id: DbId) -> Result<Option<Activity>, StoreError>;

    /// `reserved += 1` iff `reserved = expected AND reserved < capacity`.
    async fn increment_reserved(&mut self, activity_id: DbId, expected: i32)
        -> Result<u64, StoreError>;

    /// `reserved -= 1`, floored at zero.
    async fn release_seat(&mut self, activity_id: DbId) -> Result<u64, StoreError>;

    // ---- registrations ----

    /// Whether the user holds a non-cancelled registration for the activity.
    async fn has_active_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_registration(
        &mut self,
        input: &CreateRegistration,
    ) -> Result<Registration, StoreError>;

    async fn lock_registration(&mut self, id: DbId) -> Result<Option<Registration>, StoreError>;

    async fn lock_registration_by_order_no(
        &mut self,
        order_no: &str,
    ) -> Result<Option<Registration>, StoreError>;

    /// The user's registration for the activity: the live one if any,
    /// otherwise the most recent cancelled one.
    async fn lock_latest_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError>;

    /// Conditional status change: applies only while the row is still in `from`.
    async fn transition_registration(
        &mut self,
        id: DbId,
        from: (RegistrationStatus, PaymentStatus),
        to: (RegistrationStatus, PaymentStatus),
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError>;

    // ---- products and inventory locks ----

    /// Locked read of several products, acquired in ascending id order.
    /// Missing ids are simply absent from the result.
    async fn lock_products(&mut self, ids: &[DbId]) -> Result<Vec<Product>, StoreError>;

    /// Sum of `locked` inventory locks on the product that expire after `now_epoch`.
    async fn locked_quantity(&mut self, product_id: DbId, now_epoch: i64)
        -> Result<i64, StoreError>;

    async fn insert_inventory_lock(
        &mut self,
        input: &CreateInventoryLock,
    ) -> Result<InventoryLock, StoreError>;

    async fn attach_locks_to_order(
        &mut self,
        lock_ids: &[DbId],
        order_id: DbId,
    ) -> Result<u64, StoreError>;

    /// Release every still-`locked` lock of the order. Returns the number of
    /// units released; zero when nothing was left to release.
    async fn release_locks_for_order(&mut self, order_id: DbId) -> Result<i64, StoreError>;

    /// `stock -= quantity, sales += quantity` iff `stock >= quantity`.
    async fn consume_stock(&mut self, product_id: DbId, quantity: i32) -> Result<u64, StoreError>;

    // ---- orders ----

    async fn insert_order(&mut self, input: &CreateOrder) -> Result<OrderWithItems, StoreError>;

    async fn lock_order(&mut self, id: DbId) -> Result<Option<OrderWithItems>, StoreError>;

    /// Conditional status change: applies only while the order is still in `from`.
    async fn transition_order(
        &mut self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError>;

    /// Persist everything done in this unit of work.
    async fn commit(self) -> Result<(), StoreError>;
}
