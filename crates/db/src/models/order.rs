//! Mall orders and their line items.

use serde::Serialize;
use sqlx::FromRow;
use wq_core::status::{OrderStatus, StatusId};
use wq_core::types::{DbId, Money, Timestamp};

use super::decode_status;
use crate::error::StoreError;

/// Unique index on `order_no`.
pub const UQ_ORDER_NO: &str = "uq_orders_order_no";

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: DbId,
    pub order_no: String,
    pub user_id: String,
    pub total_amount: Money,
    pub status_id: StatusId,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub remark: Option<String>,
    pub pay_time: Option<Timestamp>,
    pub cancel_time: Option<Timestamp>,
    pub cancel_reason: Option<String>,
    pub created_at: Timestamp,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, StoreError> {
        decode_status("orders", self.id, self.status_id, OrderStatus::from_id)
    }
}

/// A row from the `order_items` table. Prices are snapshots taken at submit time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderItem {
    pub id: DbId,
    pub order_id: DbId,
    pub product_id: DbId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i32,
    pub subtotal: Money,
}

/// An order together with the items it owns.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// DTO for inserting an order line.
#[derive(Debug, Clone)]
pub struct CreateOrderItem {
    pub product_id: DbId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i32,
    pub subtotal: Money,
}

/// DTO for inserting an order with its items (always `pending`).
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_no: String,
    pub user_id: String,
    pub total_amount: Money,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,
    pub remark: Option<String>,
    pub created_at: Timestamp,
    pub items: Vec<CreateOrderItem>,
}
