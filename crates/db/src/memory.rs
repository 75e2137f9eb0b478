//! In-process [`ReservationStore`] for tests and local runs.
//!
//! A transaction takes the store-wide mutex for its whole lifetime and works
//! on a staged copy of the tables; `commit` swaps the copy in, dropping the
//! transaction discards it. Transactions are therefore fully serialised,
//! which is at least as strong as the row locks [`crate::PgStore`] takes.
//!
//! Do not call the store's own read methods while holding a transaction
//! from the same store: the read would wait on the mutex the transaction holds.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wq_core::status::{
    ActivityStatus, LockStatus, OrderStatus, PaymentStatus, RegistrationStatus,
};
use wq_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::models::activity::{Activity, CreateActivity};
use crate::models::inventory_lock::{CreateInventoryLock, InventoryLock};
use crate::models::order::{CreateOrder, Order, OrderItem, OrderWithItems, UQ_ORDER_NO};
use crate::models::product::{CreateProduct, Product};
use crate::models::registration::{
    CreateRegistration, Registration, UQ_ACTIVE_REGISTRATION, UQ_REGISTRATION_ORDER_NO,
};
use crate::store::{ReservationStore, StoreTx, TransitionStamp};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: DbId,
    activities: BTreeMap<DbId, Activity>,
    registrations: BTreeMap<DbId, Registration>,
    products: BTreeMap<DbId, Product>,
    inventory_locks: BTreeMap<DbId, InventoryLock>,
    orders: BTreeMap<DbId, Order>,
    order_items: BTreeMap<DbId, OrderItem>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn order_with_items(&self, order: &Order) -> OrderWithItems {
        let items = self
            .order_items
            .values()
            .filter(|item| item.order_id == order.id)
            .cloned()
            .collect();
        OrderWithItems {
            order: order.clone(),
            items,
        }
    }

    fn is_active_registration(reg: &Registration, activity_id: DbId, user_id: &str) -> bool {
        reg.activity_id == activity_id
            && reg.user_id == user_id
            && reg.status_id != RegistrationStatus::Cancelled.id()
    }
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Seeding and inspection
    // ---------------------------------------------------------------------

    pub async fn create_activity(&self, input: &CreateActivity) -> Activity {
        let mut tables = self.tables.lock().await;
        let activity = Activity {
            id: tables.next_id(),
            title: input.title.clone(),
            capacity: input.capacity,
            reserved: 0,
            status_id: input.status.id(),
            registration_deadline: input.registration_deadline,
            price: input.price,
            deleted: false,
            created_at: Utc::now(),
        };
        tables.activities.insert(activity.id, activity.clone());
        activity
    }

    /// Soft-delete an activity.
    pub async fn delete_activity(&self, id: DbId) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.activities.get_mut(&id) {
            Some(activity) => {
                activity.deleted = true;
                true
            }
            None => false,
        }
    }

    pub async fn create_product(&self, input: &CreateProduct) -> Product {
        let mut tables = self.tables.lock().await;
        let product = Product {
            id: tables.next_id(),
            name: input.name.clone(),
            price: input.price,
            stock: input.stock,
            sales: 0,
            created_at: Utc::now(),
        };
        tables.products.insert(product.id, product.clone());
        product
    }

    /// Change a product's list price (prices are snapshotted into order items).
    pub async fn set_product_price(&self, id: DbId, price: Decimal) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.products.get_mut(&id) {
            Some(product) => {
                product.price = price;
                true
            }
            None => false,
        }
    }

    pub async fn inventory_locks(&self) -> Vec<InventoryLock> {
        self.tables.lock().await.inventory_locks.values().cloned().collect()
    }

    pub async fn registrations(&self) -> Vec<Registration> {
        self.tables.lock().await.registrations.values().cloned().collect()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }

    async fn find_activity(&self, id: DbId) -> Result<Option<Activity>, StoreError> {
        Ok(self.tables.lock().await.activities.get(&id).cloned())
    }

    async fn find_registration(&self, id: DbId) -> Result<Option<Registration>, StoreError> {
        Ok(self.tables.lock().await.registrations.get(&id).cloned())
    }

    async fn find_product(&self, id: DbId) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn find_order(&self, id: DbId) -> Result<Option<OrderWithItems>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&id).map(|order| tables.order_with_items(order)))
    }

    async fn list_orders_by_user(&self, user_id: &str) -> Result<Vec<OrderWithItems>, StoreError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<&Order> = tables
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders
            .into_iter()
            .map(|order| tables.order_with_items(order))
            .collect())
    }

    async fn find_expired_pending_orders(
        &self,
        created_before: Timestamp,
    ) -> Result<Vec<DbId>, StoreError> {
        let tables = self.tables.lock().await;
        let mut expired: Vec<&Order> = tables
            .orders
            .values()
            .filter(|order| {
                order.status_id == OrderStatus::Pending.id() && order.created_at < created_before
            })
            .collect();
        expired.sort_by_key(|order| (order.created_at, order.id));
        Ok(expired.into_iter().map(|order| order.id).collect())
    }

    async fn find_expired_unpaid_registrations(
        &self,
        now: Timestamp,
    ) -> Result<Vec<DbId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .registrations
            .values()
            .filter(|reg| {
                reg.status_id == RegistrationStatus::Registered.id()
                    && reg.payment_status_id == PaymentStatus::Unpaid.id()
                    && reg.payment_expired(now)
            })
            .map(|reg| reg.id)
            .collect())
    }

    async fn close_expired_activities(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut closed = 0;
        for activity in tables.activities.values_mut() {
            if !activity.deleted
                && activity.status_id == ActivityStatus::Registering.id()
                && activity.deadline_passed(now)
            {
                activity.status_id = ActivityStatus::Closed.id();
                closed += 1;
            }
        }
        Ok(closed)
    }
}

/// A staged unit of work over [`MemoryStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_activity(&mut self, id: DbId) -> Result<Option<Activity>, StoreError> {
        Ok(self.staged.activities.get(&id).cloned())
    }

    async fn increment_reserved(
        &mut self,
        activity_id: DbId,
        expected: i32,
    ) -> Result<u64, StoreError> {
        match self.staged.activities.get_mut(&activity_id) {
            Some(a) if a.reserved == expected && a.reserved < a.capacity => {
                a.reserved += 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn release_seat(&mut self, activity_id: DbId) -> Result<u64, StoreError> {
        match self.staged.activities.get_mut(&activity_id) {
            Some(a) => {
                a.reserved = (a.reserved - 1).max(0);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn has_active_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .registrations
            .values()
            .any(|reg| Tables::is_active_registration(reg, activity_id, user_id)))
    }

    async fn insert_registration(
        &mut self,
        input: &CreateRegistration,
    ) -> Result<Registration, StoreError> {
        for reg in self.staged.registrations.values() {
            if Tables::is_active_registration(reg, input.activity_id, &input.user_id) {
                return Err(StoreError::UniqueViolation(UQ_ACTIVE_REGISTRATION.into()));
            }
            if reg.order_no == input.order_no {
                return Err(StoreError::UniqueViolation(UQ_REGISTRATION_ORDER_NO.into()));
            }
        }
        let reg = Registration {
            id: self.staged.next_id(),
            activity_id: input.activity_id,
            user_id: input.user_id.clone(),
            user_name: input.user_name.clone(),
            user_phone: input.user_phone.clone(),
            remarks: input.remarks.clone(),
            status_id: RegistrationStatus::Registered.id(),
            payment_status_id: input.payment_status.id(),
            payment_amount: input.payment_amount,
            payment_time: input.payment_time,
            payment_expire_time: input.payment_expire_time,
            order_no: input.order_no.clone(),
            cancel_time: None,
            cancel_reason: None,
            created_at: input.created_at,
        };
        self.staged.registrations.insert(reg.id, reg.clone());
        Ok(reg)
    }

    async fn lock_registration(&mut self, id: DbId) -> Result<Option<Registration>, StoreError> {
        Ok(self.staged.registrations.get(&id).cloned())
    }

    async fn lock_registration_by_order_no(
        &mut self,
        order_no: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .staged
            .registrations
            .values()
            .find(|reg| reg.order_no == order_no)
            .cloned())
    }

    async fn lock_latest_registration(
        &mut self,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .staged
            .registrations
            .values()
            .filter(|reg| reg.activity_id == activity_id && reg.user_id == user_id)
            .max_by_key(|reg| {
                (
                    Tables::is_active_registration(reg, activity_id, user_id),
                    reg.created_at,
                    reg.id,
                )
            })
            .cloned())
    }

    async fn transition_registration(
        &mut self,
        id: DbId,
        from: (RegistrationStatus, PaymentStatus),
        to: (RegistrationStatus, PaymentStatus),
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError> {
        let Some(reg) = self.staged.registrations.get_mut(&id) else {
            return Ok(0);
        };
        if reg.status_id != from.0.id() || reg.payment_status_id != from.1.id() {
            return Ok(0);
        }
        reg.status_id = to.0.id();
        reg.payment_status_id = to.1.id();
        if let Some(at) = stamp.paid_at {
            reg.payment_time = Some(at);
        }
        if let Some(at) = stamp.cancelled_at {
            reg.cancel_time = Some(at);
        }
        if let Some(reason) = stamp.reason {
            reg.cancel_reason = Some(reason.to_string());
        }
        Ok(1)
    }

    async fn lock_products(&mut self, ids: &[DbId]) -> Result<Vec<Product>, StoreError> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Ok(sorted
            .iter()
            .filter_map(|id| self.staged.products.get(id).cloned())
            .collect())
    }

    async fn locked_quantity(
        &mut self,
        product_id: DbId,
        now_epoch: i64,
    ) -> Result<i64, StoreError> {
        Ok(self
            .staged
            .inventory_locks
            .values()
            .filter(|lock| lock.product_id == product_id && lock.is_active(now_epoch))
            .map(|lock| i64::from(lock.quantity))
            .sum())
    }

    async fn insert_inventory_lock(
        &mut self,
        input: &CreateInventoryLock,
    ) -> Result<InventoryLock, StoreError> {
        let lock = InventoryLock {
            id: self.staged.next_id(),
            product_id: input.product_id,
            order_id: None,
            quantity: input.quantity,
            expire_time: input.expire_time,
            status_id: LockStatus::Locked.id(),
            created_at: input.created_at,
        };
        self.staged.inventory_locks.insert(lock.id, lock.clone());
        Ok(lock)
    }

    async fn attach_locks_to_order(
        &mut self,
        lock_ids: &[DbId],
        order_id: DbId,
    ) -> Result<u64, StoreError> {
        let mut updated = 0;
        for id in lock_ids {
            if let Some(lock) = self.staged.inventory_locks.get_mut(id) {
                lock.order_id = Some(order_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn release_locks_for_order(&mut self, order_id: DbId) -> Result<i64, StoreError> {
        let mut released = 0;
        for lock in self.staged.inventory_locks.values_mut() {
            if lock.order_id == Some(order_id) && lock.status_id == LockStatus::Locked.id() {
                lock.status_id = LockStatus::Released.id();
                released += i64::from(lock.quantity);
            }
        }
        Ok(released)
    }

    async fn consume_stock(&mut self, product_id: DbId, quantity: i32) -> Result<u64, StoreError> {
        match self.staged.products.get_mut(&product_id) {
            Some(p) if p.stock >= quantity => {
                p.stock -= quantity;
                p.sales += quantity;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_order(&mut self, input: &CreateOrder) -> Result<OrderWithItems, StoreError> {
        if self
            .staged
            .orders
            .values()
            .any(|order| order.order_no == input.order_no)
        {
            return Err(StoreError::UniqueViolation(UQ_ORDER_NO.into()));
        }
        let order = Order {
            id: self.staged.next_id(),
            order_no: input.order_no.clone(),
            user_id: input.user_id.clone(),
            total_amount: input.total_amount,
            status_id: OrderStatus::Pending.id(),
            receiver_name: input.receiver_name.clone(),
            receiver_phone: input.receiver_phone.clone(),
            receiver_address: input.receiver_address.clone(),
            remark: input.remark.clone(),
            pay_time: None,
            cancel_time: None,
            cancel_reason: None,
            created_at: input.created_at,
        };
        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let item = OrderItem {
                id: self.staged.next_id(),
                order_id: order.id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                subtotal: line.subtotal,
            };
            self.staged.order_items.insert(item.id, item.clone());
            items.push(item);
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(OrderWithItems { order, items })
    }

    async fn lock_order(&mut self, id: DbId) -> Result<Option<OrderWithItems>, StoreError> {
        Ok(self
            .staged
            .orders
            .get(&id)
            .map(|order| self.staged.order_with_items(order)))
    }

    async fn transition_order(
        &mut self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, StoreError> {
        let Some(order) = self.staged.orders.get_mut(&id) else {
            return Ok(0);
        };
        if order.status_id != from.id() {
            return Ok(0);
        }
        order.status_id = to.id();
        if let Some(at) = stamp.paid_at {
            order.pay_time = Some(at);
        }
        if let Some(at) = stamp.cancelled_at {
            order.cancel_time = Some(at);
        }
        if let Some(reason) = stamp.reason {
            order.cancel_reason = Some(reason.to_string());
        }
        Ok(1)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
