#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use wq_core::clock::{Clock, ManualClock};
use wq_core::status::ActivityStatus;
use wq_core::types::{DbId, Timestamp};
use wq_db::models::activity::{Activity, CreateActivity};
use wq_db::models::product::{CreateProduct, Product};
use wq_db::MemoryStore;
use wq_lifecycle::order::{OrderLine, Receiver, SubmitOrder};
use wq_lifecycle::registration::ReserveSeat;
use wq_lifecycle::{LifecycleConfig, LifecycleManager};

pub const SECRET: &str = "integration-secret";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub manager: Arc<LifecycleManager<MemoryStore>>,
}

impl Harness {
    pub fn clock_now(&self) -> Timestamp {
        self.clock.now()
    }
}

pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let manager = LifecycleManager::new(Arc::clone(&store), LifecycleConfig::new(SECRET))
        .with_clock(clock.clone());
    Harness {
        store,
        clock,
        manager: Arc::new(manager),
    }
}

pub async fn seed_activity(store: &MemoryStore, capacity: i32, price: Decimal) -> Activity {
    store
        .create_activity(&CreateActivity {
            title: "Neighbourhood yoga".into(),
            capacity,
            status: ActivityStatus::Registering,
            registration_deadline: None,
            price,
        })
        .await
}

pub async fn seed_product(store: &MemoryStore, price: Decimal, stock: i32) -> Product {
    store
        .create_product(&CreateProduct {
            name: format!("Product @{price}"),
            price,
            stock,
        })
        .await
}

pub fn reserve(activity_id: DbId, user: &str) -> ReserveSeat {
    ReserveSeat {
        activity_id,
        user_id: user.into(),
        user_name: format!("Resident {user}"),
        user_phone: Some("13912345678".into()),
        remarks: None,
    }
}

pub fn submit(user: &str, lines: &[(DbId, i32)]) -> SubmitOrder {
    SubmitOrder {
        user_id: user.into(),
        items: lines
            .iter()
            .map(|&(product_id, quantity)| OrderLine {
                product_id,
                quantity,
            })
            .collect(),
        receiver: Receiver {
            name: "Zhang San".into(),
            phone: "13800138000".into(),
            address: "12 Riverside Lane".into(),
        },
        remark: None,
    }
}
