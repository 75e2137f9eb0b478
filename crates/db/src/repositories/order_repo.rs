//! Repository for the `orders` and `order_items` tables.
//!
//! Items are always loaded together with their order.

use std::collections::HashMap;

use sqlx::PgConnection;
use wq_core::status::OrderStatus;
use wq_core::types::{DbId, Timestamp};

use crate::models::order::{CreateOrder, Order, OrderItem, OrderWithItems};
use crate::store::TransitionStamp;

/// Column list for `orders` queries.
const COLUMNS: &str = "\
    id, order_no, user_id, total_amount, status_id, \
    receiver_name, receiver_phone, receiver_address, remark, \
    pay_time, cancel_time, cancel_reason, created_at";

/// Column list for `order_items` queries.
const ITEM_COLUMNS: &str =
    "id, order_id, product_id, product_name, unit_price, quantity, subtotal";

pub struct OrderRepo;

impl OrderRepo {
    /// Insert the order and all of its items.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateOrder,
    ) -> Result<OrderWithItems, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders \
                (order_no, user_id, total_amount, status_id, receiver_name, \
                 receiver_phone, receiver_address, remark, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(&input.order_no)
            .bind(&input.user_id)
            .bind(input.total_amount)
            .bind(OrderStatus::Pending.id())
            .bind(&input.receiver_name)
            .bind(&input.receiver_phone)
            .bind(&input.receiver_address)
            .bind(&input.remark)
            .bind(input.created_at)
            .fetch_one(&mut *conn)
            .await?;

        let item_query = format!(
            "INSERT INTO order_items \
                (order_id, product_id, product_name, unit_price, quantity, subtotal) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ITEM_COLUMNS}"
        );
        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let item = sqlx::query_as::<_, OrderItem>(&item_query)
                .bind(order.id)
                .bind(line.product_id)
                .bind(&line.product_name)
                .bind(line.unit_price)
                .bind(line.quantity)
                .bind(line.subtotal)
                .fetch_one(&mut *conn)
                .await?;
            items.push(item);
        }
        Ok(OrderWithItems { order, items })
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<OrderWithItems>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1");
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Self::with_items(conn, order).await
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<OrderWithItems>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Self::with_items(conn, order).await
    }

    /// All orders of a user with their items, newest first.
    pub async fn list_by_user(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> Result<Vec<OrderWithItems>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&query)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<DbId> = orders.iter().map(|o| o.id).collect();
        let item_query = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        );
        let items = sqlx::query_as::<_, OrderItem>(&item_query)
            .bind(&ids)
            .fetch_all(conn)
            .await?;

        let mut by_order: HashMap<DbId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }
        Ok(orders
            .into_iter()
            .map(|order| OrderWithItems {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    /// Conditional status change. Returns rows affected.
    pub async fn transition(
        conn: &mut PgConnection,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE orders \
             SET status_id = $3, \
                 pay_time = COALESCE($4, pay_time), \
                 cancel_time = COALESCE($5, cancel_time), \
                 cancel_reason = COALESCE($6, cancel_reason) \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .bind(stamp.paid_at)
        .bind(stamp.cancelled_at)
        .bind(stamp.reason)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Ids of pending orders created before the cutoff, oldest first.
    pub async fn list_pending_created_before(
        conn: &mut PgConnection,
        cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM orders WHERE status_id = $1 AND created_at < $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(OrderStatus::Pending.id())
        .bind(cutoff)
        .fetch_all(conn)
        .await
    }

    async fn with_items(
        conn: &mut PgConnection,
        order: Option<Order>,
    ) -> Result<Option<OrderWithItems>, sqlx::Error> {
        let Some(order) = order else {
            return Ok(None);
        };
        let query =
            format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id");
        let items = sqlx::query_as::<_, OrderItem>(&query)
            .bind(order.id)
            .fetch_all(conn)
            .await?;
        Ok(Some(OrderWithItems { order, items }))
    }
}
