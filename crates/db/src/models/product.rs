//! Products: the inventory resource.

use serde::Serialize;
use sqlx::FromRow;
use wq_core::types::{DbId, Money, Timestamp};

/// A row from the `products` table.
///
/// `stock` is committed, owned units. What can still be reserved is
/// `stock` minus the sum of active, unexpired inventory locks.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: DbId,
    pub name: String,
    pub price: Money,
    pub stock: i32,
    pub sales: i32,
    pub created_at: Timestamp,
}

/// DTO for creating a product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub name: String,
    pub price: Money,
    pub stock: i32,
}
