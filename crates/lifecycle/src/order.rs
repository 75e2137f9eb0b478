//! Mall-order flow: submit, pay, cancel, ship, complete, and order queries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use wq_core::error::{ConflictKind, CoreError, IntegrityViolation};
use wq_core::order_no::{self, ORDER_PREFIX};
use wq_core::payment::PaymentRequest;
use wq_core::rate_limit::keys;
use wq_core::signing::SignedAmount;
use wq_core::status::{order_transition, OrderEvent, OrderStatus};
use wq_core::types::{DbId, Money, Timestamp};
use wq_core::validation::{validate_phone, validate_quantity, validate_required};
use wq_db::models::inventory_lock::CreateInventoryLock;
use wq_db::models::order::{CreateOrder, CreateOrderItem, OrderWithItems};
use wq_db::{ReservationStore, StoreTx, TransitionStamp};

use crate::error::{ensure_moved, LifecycleError, LifecycleResult};
use crate::manager::LifecycleManager;

/// Cancel reason recorded by the order-timeout sweep and late payments.
pub const ORDER_TIMEOUT_REASON: &str = "order timeout";

/// Cancel reason recorded when the payment provider refuses a new order.
pub const PAYMENT_SETUP_FAILED_REASON: &str = "payment setup failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderLine {
    pub product_id: DbId,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Receiver {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrder {
    pub user_id: String,
    pub items: Vec<OrderLine>,
    pub receiver: Receiver,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSubmission {
    pub order_id: DbId,
    pub order_no: String,
    pub total_amount: Money,
    /// When the order's inventory locks lapse.
    pub expire_time: Timestamp,
    pub signature: String,
    /// Signing time, epoch milliseconds.
    pub timestamp: i64,
    pub pay_params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPayment {
    pub order_id: DbId,
    pub order_no: String,
    pub paid_at: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCancellation {
    pub order_id: DbId,
    /// Units returned to availability; zero if nothing was still locked.
    pub released_stock: i64,
}

impl<S: ReservationStore> LifecycleManager<S> {
    /// Create a pending order holding inventory locks for every line.
    ///
    /// Products are locked (ascending id) before availability is computed,
    /// so concurrent submits for the same product serialise. Prices come
    /// from the stored product, never from the caller. If any line fails,
    /// no lock, order, or item is written.
    pub async fn submit_order(&self, input: SubmitOrder) -> LifecycleResult<OrderSubmission> {
        validate_submit(&input)?;
        self.rate_limit(
            &keys::order_create(&input.user_id),
            self.config.order_create_limit,
        )?;

        let now = self.clock.now();
        let now_epoch = now.timestamp();
        let expire_time = now + self.config.order_timeout;

        let mut tx = self.store.begin().await?;
        let ids: Vec<DbId> = input.items.iter().map(|line| line.product_id).collect();
        let products: HashMap<DbId, _> = tx
            .lock_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut total = Money::ZERO;
        let mut lock_ids = Vec::with_capacity(input.items.len());
        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| CoreError::not_found("Product", line.product_id))?;

            let available = if product.stock > 0 {
                i64::from(product.stock) - tx.locked_quantity(product.id, now_epoch).await?
            } else {
                0
            };
            if i64::from(line.quantity) > available {
                return Err(LifecycleError::conflict(ConflictKind::InsufficientStock {
                    product_id: product.id,
                    available: available.max(0),
                }));
            }

            let lock = tx
                .insert_inventory_lock(&CreateInventoryLock {
                    product_id: product.id,
                    quantity: line.quantity,
                    expire_time: lock_expiry_epoch(expire_time),
                    created_at: now,
                })
                .await?;
            lock_ids.push(lock.id);

            let subtotal = product.price * Money::from(line.quantity);
            total += subtotal;
            items.push(CreateOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                subtotal,
            });
        }

        let order = tx
            .insert_order(&CreateOrder {
                order_no: order_no::generate(ORDER_PREFIX, now),
                user_id: input.user_id.clone(),
                total_amount: total,
                receiver_name: input.receiver.name.trim().to_string(),
                receiver_phone: input.receiver.phone.trim().to_string(),
                receiver_address: input.receiver.address.trim().to_string(),
                remark: input.remark.clone(),
                created_at: now,
                items,
            })
            .await?
            .order;
        tx.attach_locks_to_order(&lock_ids, order.id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            order_no = %order.order_no,
            user_id = %order.user_id,
            total = %order.total_amount,
            lines = lock_ids.len(),
            "Order submitted"
        );

        let signed = self.signer.stamp(order.id, order.total_amount, now);
        let request = PaymentRequest {
            out_trade_no: order.order_no.clone(),
            amount: order.total_amount,
            payer: order.user_id.clone(),
            description: format!("Order {}", order.order_no),
        };
        let handle = match self.payments.create_payment(&request, now).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(
                    order_id = order.id,
                    error = %err,
                    "Payment setup failed, cancelling order"
                );
                if let Err(cancel_err) = self
                    .cancel_order(order.id, Some(PAYMENT_SETUP_FAILED_REASON))
                    .await
                {
                    tracing::error!(
                        order_id = order.id,
                        error = %cancel_err,
                        "Cancelling order after payment failure also failed"
                    );
                }
                return Err(err.into());
            }
        };

        Ok(OrderSubmission {
            order_id: order.id,
            order_no: order.order_no,
            total_amount: order.total_amount,
            expire_time,
            signature: signed.signature,
            timestamp: signed.timestamp,
            pay_params: handle.params,
        })
    }

    /// `pending → paid`: consume stock, release the order's locks, stamp `pay_time`.
    ///
    /// A pay attempt past the order's timeout cancels the order instead,
    /// commits that, and reports [`ConflictKind::Expired`].
    pub async fn pay_order(&self, order_id: DbId) -> LifecycleResult<OrderPayment> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let OrderWithItems { order, items } = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?;
        self.rate_limit(&keys::order_pay(&order.user_id), self.config.order_pay_limit)?;

        let status = order.status()?;
        let target = order_transition(status, OrderEvent::Pay)?;

        if order.created_at + self.config.order_timeout < now {
            let released =
                cancel_locked_order(&mut tx, order_id, status, now, Some(ORDER_TIMEOUT_REASON))
                    .await?;
            tx.commit().await?;
            tracing::warn!(
                order_id,
                released,
                "Payment arrived after order timeout; order cancelled"
            );
            return Err(LifecycleError::conflict(ConflictKind::Expired { entity: "order" }));
        }

        for item in &items {
            if tx.consume_stock(item.product_id, item.quantity).await? == 0 {
                let available = tx
                    .lock_products(&[item.product_id])
                    .await?
                    .first()
                    .map_or(0, |p| i64::from(p.stock));
                return Err(LifecycleError::conflict(ConflictKind::InsufficientStock {
                    product_id: item.product_id,
                    available,
                }));
            }
        }
        tx.release_locks_for_order(order_id).await?;

        let moved = tx
            .transition_order(order_id, status, target, TransitionStamp::paid(now))
            .await?;
        ensure_moved(moved, "order", status.name(), OrderEvent::Pay.name())?;
        tx.commit().await?;

        tracing::info!(
            order_id,
            order_no = %order.order_no,
            amount = %order.total_amount,
            "Order paid"
        );
        Ok(OrderPayment {
            order_id,
            order_no: order.order_no,
            paid_at: now,
        })
    }

    /// Check a client-echoed amount signature against the stored order.
    pub async fn verify_order_amount(&self, proof: &SignedAmount) -> LifecycleResult<()> {
        let order = self
            .store
            .find_order(proof.resource_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", proof.resource_id))?
            .order;

        if let Err(err) = self.signer.verify(proof, self.clock.now()) {
            tracing::warn!(order_id = order.id, error = %err, "Amount signature rejected");
            return Err(err.into());
        }
        if proof.amount != order.total_amount {
            tracing::warn!(
                order_id = order.id,
                claimed = %proof.amount,
                stored = %order.total_amount,
                "Signed amount does not match order total"
            );
            return Err(CoreError::Integrity(IntegrityViolation::Mismatch).into());
        }
        Ok(())
    }

    /// Verify the amount proof issued at submit time, then pay.
    pub async fn pay_order_signed(
        &self,
        order_id: DbId,
        proof: &SignedAmount,
    ) -> LifecycleResult<OrderPayment> {
        if proof.resource_id != order_id {
            tracing::warn!(
                order_id,
                signed_for = proof.resource_id,
                "Amount proof is for another order"
            );
            return Err(CoreError::Integrity(IntegrityViolation::Mismatch).into());
        }
        self.verify_order_amount(proof).await?;
        self.pay_order(order_id).await
    }

    /// `pending → cancelled`, releasing the order's inventory locks.
    pub async fn cancel_order(
        &self,
        order_id: DbId,
        reason: Option<&str>,
    ) -> LifecycleResult<OrderCancellation> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?
            .order;

        let released = cancel_locked_order(&mut tx, order_id, order.status()?, now, reason).await?;
        tx.commit().await?;

        tracing::info!(order_id, released, reason, "Order cancelled");
        Ok(OrderCancellation {
            order_id,
            released_stock: released,
        })
    }

    /// `paid → shipped`.
    pub async fn ship_order(&self, order_id: DbId) -> LifecycleResult<()> {
        self.advance_order(order_id, OrderEvent::Ship).await
    }

    /// `shipped → completed`.
    pub async fn complete_order(&self, order_id: DbId) -> LifecycleResult<()> {
        self.advance_order(order_id, OrderEvent::Complete).await
    }

    /// One of the user's orders. Someone else's order reads as not found.
    pub async fn order_detail(
        &self,
        user_id: &str,
        order_id: DbId,
    ) -> LifecycleResult<OrderWithItems> {
        self.rate_limit(&keys::query(user_id), self.config.query_limit)?;
        self.store
            .find_order(order_id)
            .await?
            .filter(|o| o.order.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("Order", order_id).into())
    }

    /// The user's orders, newest first.
    pub async fn user_orders(&self, user_id: &str) -> LifecycleResult<Vec<OrderWithItems>> {
        validate_required("user_id", user_id)?;
        self.rate_limit(&keys::query(user_id), self.config.query_limit)?;
        Ok(self.store.list_orders_by_user(user_id).await?)
    }

    /// Cancel one pending order past its timeout. `None` when the order
    /// left `pending` since the sweep listed it.
    pub(crate) async fn expire_order(&self, order_id: DbId) -> LifecycleResult<Option<i64>> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?
            .order;

        let status = order.status()?;
        if status != OrderStatus::Pending || order.created_at + self.config.order_timeout >= now {
            return Ok(None);
        }
        let released =
            cancel_locked_order(&mut tx, order_id, status, now, Some(ORDER_TIMEOUT_REASON)).await?;
        tx.commit().await?;

        tracing::info!(order_id, released, "Pending order timed out");
        Ok(Some(released))
    }

    async fn advance_order(&self, order_id: DbId, event: OrderEvent) -> LifecycleResult<()> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?
            .order;
        let status = order.status()?;
        let target = order_transition(status, event)?;

        let moved = tx
            .transition_order(order_id, status, target, TransitionStamp::default())
            .await?;
        ensure_moved(moved, "order", status.name(), event.name())?;
        tx.commit().await?;

        tracing::info!(order_id, from = status.name(), to = target.name(), "Order advanced");
        Ok(())
    }
}

/// The one Cancel path for orders: release locks, then the status change,
/// inside the caller's transaction. Returns units released.
async fn cancel_locked_order<T: StoreTx>(
    tx: &mut T,
    order_id: DbId,
    status: OrderStatus,
    now: Timestamp,
    reason: Option<&str>,
) -> LifecycleResult<i64> {
    let target = order_transition(status, OrderEvent::Cancel)?;
    let released = tx.release_locks_for_order(order_id).await?;
    let moved = tx
        .transition_order(order_id, status, target, TransitionStamp::cancelled(now, reason))
        .await?;
    ensure_moved(moved, "order", status.name(), OrderEvent::Cancel.name())?;
    Ok(released)
}

/// Lock expiry in epoch seconds, rounded up so a lock never lapses before
/// its order can no longer be paid.
fn lock_expiry_epoch(expire_time: Timestamp) -> i64 {
    let secs = expire_time.timestamp();
    if expire_time.timestamp_subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn validate_submit(input: &SubmitOrder) -> Result<(), CoreError> {
    validate_required("user_id", &input.user_id)?;
    if input.items.is_empty() {
        return Err(CoreError::Validation("order must contain at least one item".into()));
    }
    for line in &input.items {
        validate_quantity(line.quantity)?;
    }
    validate_required("receiver_name", &input.receiver.name)?;
    validate_phone("receiver_phone", input.receiver.phone.trim())?;
    validate_required("receiver_address", &input.receiver.address)?;
    Ok(())
}
