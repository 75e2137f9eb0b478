//! PostgreSQL store tests. Run with `DATABASE_URL` set:
//! `cargo test -p wq-db -- --ignored`.

use assert_matches::assert_matches;
use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use wq_core::status::{ActivityStatus, LockStatus, OrderStatus, PaymentStatus, RegistrationStatus};
use wq_db::models::activity::CreateActivity;
use wq_db::models::inventory_lock::CreateInventoryLock;
use wq_db::models::order::{CreateOrder, CreateOrderItem};
use wq_db::models::product::CreateProduct;
use wq_db::models::registration::{CreateRegistration, UQ_ACTIVE_REGISTRATION};
use wq_db::repositories::{ActivityRepo, InventoryLockRepo, ProductRepo};
use wq_db::{PgStore, ReservationStore, StoreTx, TransitionStamp};

async fn seed_activity(pool: &PgPool, capacity: i32) -> i64 {
    let mut conn = pool.acquire().await.unwrap();
    ActivityRepo::create(
        &mut conn,
        &CreateActivity {
            title: "Community cleanup".into(),
            capacity,
            status: ActivityStatus::Registering,
            registration_deadline: None,
            price: dec!(0),
        },
    )
    .await
    .unwrap()
    .id
}

fn registration(activity_id: i64, user: &str, order_no: &str) -> CreateRegistration {
    CreateRegistration {
        activity_id,
        user_id: user.into(),
        user_name: "Li Lei".into(),
        user_phone: None,
        remarks: None,
        payment_status: PaymentStatus::Paid,
        payment_amount: dec!(0),
        payment_time: Some(Utc::now()),
        payment_expire_time: None,
        order_no: order_no.into(),
        created_at: Utc::now(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn seat_cas_stops_at_capacity(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let id = seed_activity(&pool, 1).await;

    let mut tx = store.begin().await.unwrap();
    let activity = tx.lock_activity(id).await.unwrap().unwrap();
    assert_eq!(tx.increment_reserved(id, activity.reserved).await.unwrap(), 1);
    assert_eq!(tx.increment_reserved(id, 1).await.unwrap(), 0);
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.release_seat(id).await.unwrap();
    tx.release_seat(id).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.find_activity(id).await.unwrap().unwrap().reserved, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn second_active_registration_hits_unique_index(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let id = seed_activity(&pool, 5).await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_registration(&registration(id, "u1", "ACT1")).await.unwrap();
    let err = tx
        .insert_registration(&registration(id, "u1", "ACT2"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(UQ_ACTIVE_REGISTRATION));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn cancelled_registration_frees_the_pair(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let id = seed_activity(&pool, 5).await;

    let mut tx = store.begin().await.unwrap();
    let reg = tx.insert_registration(&registration(id, "u1", "ACT1")).await.unwrap();
    let moved = tx
        .transition_registration(
            reg.id,
            (RegistrationStatus::Registered, PaymentStatus::Paid),
            (RegistrationStatus::Cancelled, PaymentStatus::Paid),
            TransitionStamp::cancelled(Utc::now(), Some("changed plans")),
        )
        .await
        .unwrap();
    assert_eq!(moved, 1);
    assert!(!tx.has_active_registration(id, "u1").await.unwrap());
    tx.insert_registration(&registration(id, "u1", "ACT2")).await.unwrap();
    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn order_locks_release_exactly_once(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let product = {
        let mut conn = pool.acquire().await.unwrap();
        ProductRepo::create(
            &mut conn,
            &CreateProduct {
                name: "Rice 5kg".into(),
                price: dec!(39.90),
                stock: 10,
            },
        )
        .await
        .unwrap()
    };
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    let lock = tx
        .insert_inventory_lock(&CreateInventoryLock {
            product_id: product.id,
            quantity: 3,
            expire_time: now.timestamp() + 900,
            created_at: now,
        })
        .await
        .unwrap();
    let order = tx
        .insert_order(&CreateOrder {
            order_no: "ORD1".into(),
            user_id: "u1".into(),
            total_amount: dec!(119.70),
            receiver_name: "Han Meimei".into(),
            receiver_phone: "13800138000".into(),
            receiver_address: "1 Garden Road".into(),
            remark: None,
            created_at: now,
            items: vec![CreateOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                unit_price: product.price,
                quantity: 3,
                subtotal: dec!(119.70),
            }],
        })
        .await
        .unwrap();
    tx.attach_locks_to_order(&[lock.id], order.order.id).await.unwrap();
    assert_eq!(tx.locked_quantity(product.id, now.timestamp()).await.unwrap(), 3);

    assert_eq!(tx.release_locks_for_order(order.order.id).await.unwrap(), 3);
    assert_eq!(tx.release_locks_for_order(order.order.id).await.unwrap(), 0);
    tx.commit().await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let locks = InventoryLockRepo::list_by_order(&mut conn, order.order.id).await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].status().unwrap(), LockStatus::Released);

    let stored = store.find_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.order.status().unwrap(), OrderStatus::Pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn deadline_sweep_closes_only_past_deadlines(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let now = Utc::now();
    let mut conn = pool.acquire().await.unwrap();
    for (title, offset) in [("past", -60), ("future", 3600)] {
        ActivityRepo::create(
            &mut conn,
            &CreateActivity {
                title: title.into(),
                capacity: 10,
                status: ActivityStatus::Registering,
                registration_deadline: Some(now + chrono::Duration::seconds(offset)),
                price: dec!(0),
            },
        )
        .await
        .unwrap();
    }
    drop(conn);

    assert_eq!(store.close_expired_activities(now).await.unwrap(), 1);
    assert_eq!(store.close_expired_activities(now).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn conditional_stock_decrement(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let mut conn = pool.acquire().await.unwrap();
    let product = ProductRepo::create(
        &mut conn,
        &CreateProduct {
            name: "Soy sauce".into(),
            price: dec!(8.80),
            stock: 2,
        },
    )
    .await
    .unwrap();
    drop(conn);

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.consume_stock(product.id, 3).await.unwrap(), 0);
    assert_eq!(tx.consume_stock(product.id, 2).await.unwrap(), 1);
    tx.commit().await.unwrap();

    let after = store.find_product(product.id).await.unwrap().unwrap();
    assert_eq!((after.stock, after.sales), (0, 2));
    assert_matches!(store.find_product(-1).await, Ok(None));
}
