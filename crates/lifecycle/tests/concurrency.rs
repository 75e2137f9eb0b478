mod common;

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal_macros::dec;
use wq_core::error::ConflictKind;
use wq_db::{MemoryStore, ReservationStore};
use wq_lifecycle::{LifecycleError, LifecycleManager};

use common::{harness, reserve, seed_activity, seed_product, submit};

async fn reserve_many(
    manager: &Arc<LifecycleManager<MemoryStore>>,
    activity_id: i64,
    users: impl IntoIterator<Item = String>,
) -> Vec<Result<(), LifecycleError>> {
    let handles = users.into_iter().map(|user| {
        let manager = Arc::clone(manager);
        tokio::spawn(async move {
            manager
                .reserve_seat(reserve(activity_id, &user))
                .await
                .map(|_| ())
        })
    });
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect()
}

fn count_conflicts(results: &[Result<(), LifecycleError>], kind: &ConflictKind) -> usize {
    results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.as_conflict() == Some(kind)))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_seat_goes_to_exactly_one_of_two() {
    let h = harness();
    let activity = seed_activity(&h.store, 1, dec!(0)).await;

    let results = reserve_many(&h.manager, activity.id, ["alice".into(), "bob".into()]).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(count_conflicts(&results, &ConflictKind::CapacityFull), 1);

    let activity = h.store.find_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(activity.reserved, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserved_never_exceeds_capacity() {
    let h = harness();
    let activity = seed_activity(&h.store, 5, dec!(0)).await;

    let results = reserve_many(&h.manager, activity.id, (0..40).map(|i| format!("user-{i}"))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert_eq!(count_conflicts(&results, &ConflictKind::CapacityFull), 35);

    let activity = h.store.find_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(activity.reserved, 5);
    assert_eq!(h.store.registrations().await.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_user_racing_themselves_gets_one_seat() {
    let h = harness();
    let activity = seed_activity(&h.store, 10, dec!(0)).await;

    let results = reserve_many(&h.manager, activity.id, (0..6).map(|_| "carol".to_string())).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(count_conflicts(&results, &ConflictKind::DuplicateRegistration), 5);

    let activity = h.store.find_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(activity.reserved, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_never_oversell() {
    let h = harness();
    let rice = seed_product(&h.store, dec!(10), 10).await;

    let handles = (0..25).map(|i| {
        let manager = Arc::clone(&h.manager);
        tokio::spawn(async move {
            manager
                .submit_order(submit(&format!("buyer-{i}"), &[(rice.id, 1)]))
                .await
                .map(|_| ())
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 10);
    let locked: i32 = h.store.inventory_locks().await.iter().map(|l| l.quantity).sum();
    assert_eq!(locked, 10);
}
