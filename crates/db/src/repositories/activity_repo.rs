//! Repository for the `activities` table.

use sqlx::PgConnection;
use wq_core::status::ActivityStatus;
use wq_core::types::{DbId, Timestamp};

use crate::models::activity::{Activity, CreateActivity};

/// Column list for `activities` queries.
const COLUMNS: &str = "\
    id, title, capacity, reserved, status_id, registration_deadline, \
    price, deleted, created_at";

pub struct ActivityRepo;

impl ActivityRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateActivity,
    ) -> Result<Activity, sqlx::Error> {
        let query = format!(
            "INSERT INTO activities (title, capacity, status_id, registration_deadline, price) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Activity>(&query)
            .bind(&input.title)
            .bind(input.capacity)
            .bind(input.status.id())
            .bind(input.registration_deadline)
            .bind(input.price)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Activity>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM activities WHERE id = $1");
        sqlx::query_as::<_, Activity>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Exclusive row lock held until the surrounding transaction ends.
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Activity>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM activities WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Activity>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Compare-and-swap seat increment. Returns rows affected (0 or 1).
    pub async fn increment_reserved(
        conn: &mut PgConnection,
        id: DbId,
        expected: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE activities SET reserved = reserved + 1 \
             WHERE id = $1 AND reserved = $2 AND reserved < capacity",
        )
        .bind(id)
        .bind(expected)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Seat decrement with a floor of zero.
    pub async fn release_seat(conn: &mut PgConnection, id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE activities SET reserved = GREATEST(reserved - 1, 0) WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// One bulk conditional update; never a fetch-then-save loop.
    pub async fn close_past_deadline(
        conn: &mut PgConnection,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE activities SET status_id = $1 \
             WHERE status_id = $2 AND deleted = FALSE \
               AND registration_deadline IS NOT NULL AND registration_deadline < $3",
        )
        .bind(ActivityStatus::Closed.id())
        .bind(ActivityStatus::Registering.id())
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
