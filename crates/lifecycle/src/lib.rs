//! The Lifecycle Manager: reserve, confirm, expire and release for both the
//! activity-registration flow and the mall-order flow.
//!
//! Every public operation runs in exactly one store transaction. An early
//! return drops the transaction and rolls back, so no operation ever leaves
//! half of its mutations behind.

pub mod config;
pub mod error;
pub mod manager;
pub mod order;
pub mod registration;
pub mod sweep;

pub use config::{ConfigError, LifecycleConfig};
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use manager::LifecycleManager;
