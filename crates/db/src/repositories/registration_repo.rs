//! Repository for the `registrations` table.

use sqlx::PgConnection;
use wq_core::status::{PaymentStatus, RegistrationStatus};
use wq_core::types::{DbId, Timestamp};

use crate::models::registration::{CreateRegistration, Registration};
use crate::store::TransitionStamp;

/// Column list for `registrations` queries.
const COLUMNS: &str = "\
    id, activity_id, user_id, user_name, user_phone, remarks, \
    status_id, payment_status_id, payment_amount, payment_time, \
    payment_expire_time, order_no, cancel_time, cancel_reason, created_at";

pub struct RegistrationRepo;

impl RegistrationRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateRegistration,
    ) -> Result<Registration, sqlx::Error> {
        let query = format!(
            "INSERT INTO registrations \
                (activity_id, user_id, user_name, user_phone, remarks, status_id, \
                 payment_status_id, payment_amount, payment_time, payment_expire_time, \
                 order_no, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Registration>(&query)
            .bind(input.activity_id)
            .bind(&input.user_id)
            .bind(&input.user_name)
            .bind(&input.user_phone)
            .bind(&input.remarks)
            .bind(RegistrationStatus::Registered.id())
            .bind(input.payment_status.id())
            .bind(input.payment_amount)
            .bind(input.payment_time)
            .bind(input.payment_expire_time)
            .bind(&input.order_no)
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM registrations WHERE id = $1");
        sqlx::query_as::<_, Registration>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Registration>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_order_no_for_update(
        conn: &mut PgConnection,
        order_no: &str,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM registrations WHERE order_no = $1 FOR UPDATE");
        sqlx::query_as::<_, Registration>(&query)
            .bind(order_no)
            .fetch_optional(conn)
            .await
    }

    /// Latest non-cancelled registration of a user for an activity, locked.
    /// Live registration first, then the newest cancelled one.
    pub async fn find_latest_for_update(
        conn: &mut PgConnection,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM registrations \
             WHERE activity_id = $1 AND user_id = $2 \
             ORDER BY (status_id <> $3) DESC, created_at DESC, id DESC \
             LIMIT 1 \
             FOR UPDATE"
        );
        sqlx::query_as::<_, Registration>(&query)
            .bind(activity_id)
            .bind(user_id)
            .bind(RegistrationStatus::Cancelled.id())
            .fetch_optional(conn)
            .await
    }

    pub async fn exists_active(
        conn: &mut PgConnection,
        activity_id: DbId,
        user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS ( \
                 SELECT 1 FROM registrations \
                 WHERE activity_id = $1 AND user_id = $2 AND status_id <> $3 \
             )",
        )
        .bind(activity_id)
        .bind(user_id)
        .bind(RegistrationStatus::Cancelled.id())
        .fetch_one(conn)
        .await
    }

    /// Conditional status change. Returns rows affected (0 when the row
    /// already moved on).
    pub async fn transition(
        conn: &mut PgConnection,
        id: DbId,
        from: (RegistrationStatus, PaymentStatus),
        to: (RegistrationStatus, PaymentStatus),
        stamp: TransitionStamp<'_>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE registrations \
             SET status_id = $4, payment_status_id = $5, \
                 payment_time = COALESCE($6, payment_time), \
                 cancel_time = COALESCE($7, cancel_time), \
                 cancel_reason = COALESCE($8, cancel_reason) \
             WHERE id = $1 AND status_id = $2 AND payment_status_id = $3",
        )
        .bind(id)
        .bind(from.0.id())
        .bind(from.1.id())
        .bind(to.0.id())
        .bind(to.1.id())
        .bind(stamp.paid_at)
        .bind(stamp.cancelled_at)
        .bind(stamp.reason)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Ids of unpaid holds whose payment window has closed, oldest first.
    pub async fn list_expired_unpaid(
        conn: &mut PgConnection,
        now: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM registrations \
             WHERE status_id = $1 AND payment_status_id = $2 \
               AND payment_expire_time IS NOT NULL AND payment_expire_time < $3 \
             ORDER BY payment_expire_time ASC, id ASC",
        )
        .bind(RegistrationStatus::Registered.id())
        .bind(PaymentStatus::Unpaid.id())
        .bind(now)
        .fetch_all(conn)
        .await
    }
}
