//! PostgreSQL [`ReservationStore`].
//!
//! Locked reads are `SELECT ... FOR UPDATE` inside the transaction; capacity
//! changes are single conditional `UPDATE`s whose `rows_affected()` is the
//! guard result.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use wq_core::status::{OrderStatus, PaymentStatus, RegistrationStatus};
use wq_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::models::activity::Activity;
use crate::models::inventory_lock::{CreateInventoryLock, InventoryLock};
use crate::models::order::{CreateOrder, OrderWithItems};
use crate::models::product::Product;
use crate::models::registration::{CreateRegistration, Registration};
use crate::repositories::{
    ActivityRepo, InventoryLockRepo, OrderRepo, ProductRepo, RegistrationRepo,
};
use crate::store::{ReservationStore, StoreTx, TransitionStamp};
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn find_activity(&self, id: DbId) -> Result<Option<Activity>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ActivityRepo::find_by_id(&mut conn, id).await?)
    }

    async fn find_registration(&self, id: DbId) -> Result<Option<Registration>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(RegistrationRepo::find_by_id(&mut conn, id).await?)
    }

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ProductRepo::find_by_id(&mut conn, id).await?)
    }

    async fn find_order(&self, id: DbId) -> Result<Option<OrderWithItems>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(OrderRepo::find_by_id(&mut conn, id).await?)
    }

    async fn list_orders_by_user(&self, user_id: &str) -> Result<Vec<OrderWithItems>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(OrderRepo::list_by_user(&mut conn, user_id).await?)
    }

    async fn find_expired_pending_orders(
        &self,
        created_before: Timestamp,
    ) -> Result<Vec<DbId>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(OrderRepo::list_pending_created_before(&mut conn, created_before).await?)
    }

    async fn find_expired_unpaid_registrations(
        &self,
        now: Timestamp,
    ) -> Result<Vec<DbId>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(RegistrationRepo::list_expired_unpaid(&mut conn, now).await?)
    }

    async fn close_expired_activities(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ActivityRepo::close_past_deadline(&mut conn, now).await?)
    }
}

/// A PostgreSQL transaction. Dropping it without `commit` rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_activity(&mut self, id: DbId) -> Result<Option<Activity>, StoreError> {
        Ok(ActivityRepo::find_by_id_for_update(&mut self.tx, id).await?)
    }

    async fn increment_reserved(
        &mut self,
        activity_id: DbId,
        expected: i32,
    ) -> Result<u64, StoreError> {
        Ok(ActivityRepo::increment_reserved(&mut self.tx, activity_id, expected).await?)
    }

    async fn release_seat(&mut self, activity_id: DbId) -> Result<u64, StoreError> {
        Ok(ActivityRepo::release_seat(&mut self.tx, activity_id).await?)
    }

    async fn has_active_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(RegistrationRepo::exists_active(&mut self.tx, activity_id, user_id).await?)
    }

    async fn insert_registration(
        &mut self,
        input: &CreateRegistration,
    ) -> Result<Registration, StoreError> {
        Ok(RegistrationRepo::create(&mut self.tx, input).await?)
    }

    async fn lock_registration(&mut self, id: DbId) -> Result<Option<Registration>, StoreError> {
        Ok(RegistrationRepo::find_by_id_for_update(&mut self.tx, id).await?)
    }

    async fn lock_registration_by_order_no(
        &mut self,
        order_no: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(RegistrationRepo::find_by_order_no_for_update(&mut self.tx, order_no).await?)
    }

    async fn lock_latest_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(RegistrationRepo::find_latest_for_update(&mut self.tx, activity_id, user_id).await?)
    }

    async fn transition_registration(
        &mut self,
        id: DbId,
        from: (RegistrationStatus, PaymentStatus),
        to: (RegistrationStatus, PaymentStatus),
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError> {
        Ok(RegistrationRepo::transition(&mut self.tx, id, from, to, stamp).await?)
    }

    async fn lock_products(&mut self, ids: &[DbId]) -> Result<Vec<Product>, StoreError> {
        Ok(ProductRepo::find_many_for_update(&mut self.tx, ids).await?)
    }

    async fn locked_quantity(
        &mut self,
        product_id: DbId,
        now_epoch: i64,
    ) -> Result<i64, StoreError> {
        Ok(InventoryLockRepo::sum_active(&mut self.tx, product_id, now_epoch).await?)
    }

    async fn insert_inventory_lock(
        &mut self,
        input: &CreateInventoryLock,
    ) -> Result<InventoryLock, StoreError> {
        Ok(InventoryLockRepo::create(&mut self.tx, input).await?)
    }

    async fn attach_locks_to_order(
        &mut self,
        lock_ids: &[DbId],
        order_id: DbId,
    ) -> Result<u64, StoreError> {
        Ok(InventoryLockRepo::attach_to_order(&mut self.tx, lock_ids, order_id).await?)
    }

    async fn release_locks_for_order(&mut self, order_id: DbId) -> Result<i64, StoreError> {
        Ok(InventoryLockRepo::release_for_order(&mut self.tx, order_id).await?)
    }

    async fn consume_stock(&mut self, product_id: DbId, quantity: i32) -> Result<u64, StoreError> {
        Ok(ProductRepo::consume_stock(&mut self.tx, product_id, quantity).await?)
    }

    async fn insert_order(&mut self, input: &CreateOrder) -> Result<OrderWithItems, StoreError> {
        Ok(OrderRepo::create(&mut self.tx, input).await?)
    }

    async fn lock_order(&mut self, id: DbId) -> Result<Option<OrderWithItems>, StoreError> {
        Ok(OrderRepo::find_by_id_for_update(&mut self.tx, id).await?)
    }

    async fn transition_order(
        &mut self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError> {
        Ok(OrderRepo::transition(&mut self.tx, id, from, to, stamp).await?)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
