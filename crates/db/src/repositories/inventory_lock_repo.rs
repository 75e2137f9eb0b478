//! Repository for the `inventory_locks` table.

use sqlx::PgConnection;
use wq_core::status::LockStatus;
use wq_core::types::DbId;

use crate::models::inventory_lock::{CreateInventoryLock, InventoryLock};

/// Column list for `inventory_locks` queries.
const COLUMNS: &str = "id, product_id, order_id, quantity, expire_time, status_id, created_at";

pub struct InventoryLockRepo;

impl InventoryLockRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateInventoryLock,
    ) -> Result<InventoryLock, sqlx::Error> {
        let query = format!(
            "INSERT INTO inventory_locks (product_id, quantity, expire_time, status_id, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InventoryLock>(&query)
            .bind(input.product_id)
            .bind(input.quantity)
            .bind(input.expire_time)
            .bind(LockStatus::Locked.id())
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    /// Units held by active locks that expire after `now_epoch`.
    pub async fn sum_active(
        conn: &mut PgConnection,
        product_id: DbId,
        now_epoch: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM inventory_locks \
             WHERE product_id = $1 AND status_id = $2 AND expire_time > $3",
        )
        .bind(product_id)
        .bind(LockStatus::Locked.id())
        .bind(now_epoch)
        .fetch_one(conn)
        .await
    }

    pub async fn attach_to_order(
        conn: &mut PgConnection,
        lock_ids: &[DbId],
        order_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE inventory_locks SET order_id = $2 WHERE id = ANY($1)")
            .bind(lock_ids)
            .bind(order_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Flip every still-locked lock of the order to released and report the
    /// units freed. Already-released locks are untouched.
    pub async fn release_for_order(
        conn: &mut PgConnection,
        order_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "WITH released AS ( \
                 UPDATE inventory_locks SET status_id = $2 \
                 WHERE order_id = $1 AND status_id = $3 \
                 RETURNING quantity \
             ) \
             SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM released",
        )
        .bind(order_id)
        .bind(LockStatus::Released.id())
        .bind(LockStatus::Locked.id())
        .fetch_one(conn)
        .await
    }

    pub async fn list_by_order(
        conn: &mut PgConnection,
        order_id: DbId,
    ) -> Result<Vec<InventoryLock>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM inventory_locks WHERE order_id = $1 ORDER BY id");
        sqlx::query_as::<_, InventoryLock>(&query)
            .bind(order_id)
            .fetch_all(conn)
            .await
    }
}
