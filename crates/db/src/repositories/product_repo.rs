//! Repository for the `products` table.

use sqlx::PgConnection;
use wq_core::types::DbId;

use crate::models::product::{CreateProduct, Product};

/// Column list for `products` queries.
const COLUMNS: &str = "id, name, price, stock, sales, created_at";

pub struct ProductRepo;

impl ProductRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateProduct,
    ) -> Result<Product, sqlx::Error> {
        let query = format!(
            "INSERT INTO products (name, price, stock) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(&input.name)
            .bind(input.price)
            .bind(input.stock)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Product>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Lock the given products in ascending id order so that two submits
    /// touching overlapping products cannot deadlock.
    pub async fn find_many_for_update(
        conn: &mut PgConnection,
        ids: &[DbId],
    ) -> Result<Vec<Product>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(ids)
            .fetch_all(conn)
            .await
    }

    /// Conditional decrement: only applies while `stock >= quantity`.
    pub async fn consume_stock(
        conn: &mut PgConnection,
        id: DbId,
        quantity: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2, sales = sales + $2 \
             WHERE id = $1 AND stock >= $2",
        )
        .bind(id)
        .bind(quantity)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
