//! Repository layer: one zero-sized struct per table with async associated
//! functions taking a `&mut PgConnection`, so each call can run either on a
//! pooled connection or inside a transaction.

pub mod activity_repo;
pub mod inventory_lock_repo;
pub mod order_repo;
pub mod product_repo;
pub mod registration_repo;

pub use activity_repo::ActivityRepo;
pub use inventory_lock_repo::InventoryLockRepo;
pub use order_repo::OrderRepo;
pub use product_repo::ProductRepo;
pub use registration_repo::RegistrationRepo;
