mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Duration;
use rust_decimal_macros::dec;
use wq_core::error::{ConflictKind, CoreError, IntegrityViolation};
use wq_core::payment::{PaymentError, PaymentHandle, PaymentProvider, PaymentRequest};
use wq_core::signing::SignedAmount;
use wq_core::status::{LockStatus, OrderStatus};
use wq_core::types::Timestamp;
use wq_db::ReservationStore;
use wq_lifecycle::{ErrorKind, LifecycleConfig, LifecycleError, LifecycleManager};

use common::{harness, seed_product, submit, SECRET};

fn conflict(err: &LifecycleError) -> ConflictKind {
    err.as_conflict().cloned().expect("expected a conflict")
}

#[tokio::test]
async fn submit_prices_from_the_store_and_locks_every_line() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(12.50), 10).await;
    let oil = seed_product(&h.store, dec!(8.80), 5).await;

    let sub = h
        .manager
        .submit_order(submit("u1", &[(rice.id, 3), (oil.id, 2)]))
        .await
        .unwrap();

    assert_eq!(sub.total_amount, dec!(55.10));
    assert!(sub.order_no.starts_with("ORD"));
    assert_eq!(sub.expire_time, h.clock_now() + Duration::minutes(15));
    assert_eq!(sub.timestamp, h.clock_now().timestamp_millis());
    assert_eq!(sub.pay_params["totalAmount"], "55.10");

    let locks = h.store.inventory_locks().await;
    assert_eq!(locks.len(), 2);
    for lock in &locks {
        assert_eq!(lock.order_id, Some(sub.order_id));
        assert_eq!(lock.status().unwrap(), LockStatus::Locked);
        assert_eq!(lock.expire_time, sub.expire_time.timestamp());
    }

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap();
    assert_eq!(order.order.status().unwrap(), OrderStatus::Pending);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].unit_price, dec!(12.50));
    assert_eq!(order.items[0].subtotal, dec!(37.50));

    // Stock itself is untouched until payment.
    let rice = h.store.find_product(rice.id).await.unwrap().unwrap();
    assert_eq!(rice.stock, 10);
}

#[tokio::test]
async fn later_price_changes_do_not_touch_existing_orders() {
    let h = harness();
    let tea = seed_product(&h.store, dec!(20), 10).await;
    let sub = h.manager.submit_order(submit("u1", &[(tea.id, 1)])).await.unwrap();

    h.store.set_product_price(tea.id, dec!(99)).await;

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap();
    assert_eq!(order.order.total_amount, dec!(20));
    assert_eq!(order.items[0].unit_price, dec!(20));
}

#[tokio::test]
async fn insufficient_stock_creates_no_locks() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 5).await;
    let oil = seed_product(&h.store, dec!(10), 5).await;
    h.manager.submit_order(submit("u1", &[(rice.id, 3)])).await.unwrap();

    let err = h
        .manager
        .submit_order(submit("u2", &[(oil.id, 1), (rice.id, 3)]))
        .await
        .unwrap_err();

    assert_eq!(
        conflict(&err),
        ConflictKind::InsufficientStock {
            product_id: rice.id,
            available: 2
        }
    );
    // Only the first order's lock exists; the failed submit left nothing behind.
    assert_eq!(h.store.inventory_locks().await.len(), 1);
    assert_eq!(h.store.list_orders_by_user("u2").await.unwrap().len(), 0);
}

#[tokio::test]
async fn expired_locks_free_up_availability() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 5).await;
    h.manager.submit_order(submit("u1", &[(rice.id, 5)])).await.unwrap();

    let err = h
        .manager
        .submit_order(submit("u2", &[(rice.id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    h.clock.advance(Duration::minutes(16));
    h.manager.submit_order(submit("u2", &[(rice.id, 5)])).await.unwrap();
}

#[tokio::test]
async fn locks_hold_until_the_order_itself_times_out() {
    let h = harness();
    h.clock.set(h.clock_now() + Duration::milliseconds(600));
    let rice = seed_product(&h.store, dec!(10), 2).await;
    let first = h.manager.submit_order(submit("u1", &[(rice.id, 2)])).await.unwrap();

    // 300ms before the order's deadline, inside the last wall-clock second.
    h.clock.advance(Duration::minutes(15) - Duration::milliseconds(300));
    let err = h
        .manager
        .submit_order(submit("u2", &[(rice.id, 1)]))
        .await
        .unwrap_err();
    assert_matches!(conflict(&err), ConflictKind::InsufficientStock { available: 0, .. });

    h.manager.pay_order(first.order_id).await.unwrap();
}

#[tokio::test]
async fn out_of_stock_product_reports_zero_available() {
    let h = harness();
    let empty = seed_product(&h.store, dec!(10), 0).await;

    let err = h
        .manager
        .submit_order(submit("u1", &[(empty.id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(
        conflict(&err),
        ConflictKind::InsufficientStock {
            product_id: empty.id,
            available: 0
        }
    );
}

#[tokio::test]
async fn submit_validation_happens_before_the_store() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 5).await;

    let cases = [
        submit("u1", &[]),
        submit("u1", &[(rice.id, 0)]),
        submit("u1", &[(rice.id, 1000)]),
        submit("", &[(rice.id, 1)]),
        {
            let mut bad = submit("u1", &[(rice.id, 1)]);
            bad.receiver.phone = "0101234567".into();
            bad
        },
        {
            let mut bad = submit("u1", &[(rice.id, 1)]);
            bad.receiver.address = " ".into();
            bad
        },
    ];
    for input in cases {
        let err = h.manager.submit_order(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
    assert!(h.store.inventory_locks().await.is_empty());
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let h = harness();
    let err = h
        .manager
        .submit_order(submit("u1", &[(777, 1)]))
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::Core(CoreError::NotFound { entity: "Product", .. }));
}

#[tokio::test]
async fn signature_round_trip_and_one_cent_tamper() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(12.34), 5).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();

    let proof = SignedAmount {
        resource_id: sub.order_id,
        amount: sub.total_amount,
        timestamp: sub.timestamp,
        signature: sub.signature.clone(),
    };
    h.manager.verify_order_amount(&proof).await.unwrap();

    let tampered = SignedAmount {
        amount: sub.total_amount - dec!(0.01),
        ..proof.clone()
    };
    let err = h.manager.verify_order_amount(&tampered).await.unwrap_err();
    assert_matches!(
        err,
        LifecycleError::Core(CoreError::Integrity(IntegrityViolation::Mismatch))
    );
}

#[tokio::test]
async fn signature_is_stale_after_six_minutes() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(12.34), 5).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();
    let proof = SignedAmount {
        resource_id: sub.order_id,
        amount: sub.total_amount,
        timestamp: sub.timestamp,
        signature: sub.signature,
    };

    h.clock.advance(Duration::minutes(6));
    let err = h.manager.verify_order_amount(&proof).await.unwrap_err();
    assert_matches!(
        err,
        LifecycleError::Core(CoreError::Integrity(IntegrityViolation::Stale))
    );
}

#[tokio::test]
async fn signed_payment_checks_the_proof_first() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(5), 5).await;
    let first = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();
    let second = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();
    let proof = SignedAmount {
        resource_id: first.order_id,
        amount: first.total_amount,
        timestamp: first.timestamp,
        signature: first.signature,
    };

    let err = h
        .manager
        .pay_order_signed(second.order_id, &proof)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let paid = h.manager.pay_order_signed(first.order_id, &proof).await.unwrap();
    assert_eq!(paid.order_id, first.order_id);
}

#[tokio::test]
async fn pay_consumes_stock_and_releases_locks() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 10).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 4)])).await.unwrap();
    h.clock.advance(Duration::minutes(3));

    let paid = h.manager.pay_order(sub.order_id).await.unwrap();
    assert_eq!(paid.paid_at, h.clock_now());

    let rice = h.store.find_product(rice.id).await.unwrap().unwrap();
    assert_eq!((rice.stock, rice.sales), (6, 4));

    let locks = h.store.inventory_locks().await;
    assert!(locks.iter().all(|l| l.status().unwrap() == LockStatus::Released));

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap().order;
    assert_eq!(order.status().unwrap(), OrderStatus::Paid);
    assert_eq!(order.pay_time, Some(h.clock_now()));

    let err = h.manager.pay_order(sub.order_id).await.unwrap_err();
    assert_matches!(
        conflict(&err),
        ConflictKind::InvalidTransition { from: "paid", event: "pay", .. }
    );
}

#[tokio::test]
async fn paying_after_timeout_cancels_instead() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 10).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 4)])).await.unwrap();
    h.clock.advance(Duration::minutes(16));

    let err = h.manager.pay_order(sub.order_id).await.unwrap_err();
    assert_eq!(conflict(&err), ConflictKind::Expired { entity: "order" });

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap().order;
    assert_eq!(order.status().unwrap(), OrderStatus::Cancelled);
    assert_eq!(order.cancel_reason.as_deref(), Some("order timeout"));

    let rice = h.store.find_product(rice.id).await.unwrap().unwrap();
    assert_eq!((rice.stock, rice.sales), (10, 0));
    let locks = h.store.inventory_locks().await;
    assert!(locks.iter().all(|l| l.status().unwrap() == LockStatus::Released));
}

#[tokio::test]
async fn cancel_twice_releases_once() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 5).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 3)])).await.unwrap();

    let first = h
        .manager
        .cancel_order(sub.order_id, Some("changed my mind"))
        .await
        .unwrap();
    assert_eq!(first.released_stock, 3);

    let err = h.manager.cancel_order(sub.order_id, None).await.unwrap_err();
    assert_matches!(
        conflict(&err),
        ConflictKind::InvalidTransition { from: "cancelled", event: "cancel", .. }
    );

    // All five units are reservable again, and no more.
    h.manager.submit_order(submit("u2", &[(rice.id, 5)])).await.unwrap();
    let err = h
        .manager
        .submit_order(submit("u3", &[(rice.id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap().order;
    assert_eq!(order.cancel_reason.as_deref(), Some("changed my mind"));
}

#[tokio::test]
async fn fulfilment_follows_the_state_machine() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 5).await;
    let sub = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();

    let err = h.manager.ship_order(sub.order_id).await.unwrap_err();
    assert_matches!(
        conflict(&err),
        ConflictKind::InvalidTransition { from: "pending", event: "ship", .. }
    );

    h.manager.pay_order(sub.order_id).await.unwrap();
    h.manager.ship_order(sub.order_id).await.unwrap();
    h.manager.complete_order(sub.order_id).await.unwrap();

    let order = h.store.find_order(sub.order_id).await.unwrap().unwrap().order;
    assert_eq!(order.status().unwrap(), OrderStatus::Completed);

    let err = h.manager.cancel_order(sub.order_id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn order_queries_are_scoped_to_the_owner() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 50).await;
    let older = h.manager.submit_order(submit("u1", &[(rice.id, 1)])).await.unwrap();
    h.clock.advance(Duration::seconds(30));
    let newer = h.manager.submit_order(submit("u1", &[(rice.id, 2)])).await.unwrap();
    h.manager.submit_order(submit("u2", &[(rice.id, 1)])).await.unwrap();

    let detail = h.manager.order_detail("u1", older.order_id).await.unwrap();
    assert_eq!(detail.items[0].quantity, 1);

    let err = h.manager.order_detail("u2", older.order_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mine = h.manager.user_orders("u1").await.unwrap();
    let ids: Vec<_> = mine.iter().map(|o| o.order.id).collect();
    assert_eq!(ids, vec![newer.order_id, older.order_id]);
}

struct DownProvider;

#[async_trait]
impl PaymentProvider for DownProvider {
    async fn create_payment(
        &self,
        _request: &PaymentRequest,
        _at: Timestamp,
    ) -> Result<PaymentHandle, PaymentError> {
        Err(PaymentError::Unavailable("gateway timeout".into()))
    }
}

#[tokio::test]
async fn provider_failure_cancels_the_new_order() {
    let h = harness();
    let manager = LifecycleManager::new(Arc::clone(&h.store), LifecycleConfig::new(SECRET))
        .with_clock(h.clock.clone())
        .with_payment_provider(Arc::new(DownProvider));
    let rice = seed_product(&h.store, dec!(10), 5).await;

    let err = manager
        .submit_order(submit("u1", &[(rice.id, 5)]))
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::Payment(PaymentError::Unavailable(_)));
    assert!(err.is_fatal());

    let orders = h.store.list_orders_by_user("u1").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order.status().unwrap(), OrderStatus::Cancelled);
    assert_eq!(
        orders[0].order.cancel_reason.as_deref(),
        Some("payment setup failed")
    );

    // The held units went back.
    h.manager.submit_order(submit("u2", &[(rice.id, 5)])).await.unwrap();
}

#[tokio::test]
async fn query_rate_limit_applies_per_user() {
    let h = harness();
    for _ in 0..100 {
        h.manager.user_orders("u1").await.unwrap();
    }
    let err = h.manager.user_orders("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    h.manager.user_orders("u2").await.unwrap();
}
