//! Domain building blocks for the reservation and order-lifecycle engine.
//!
//! This crate has zero internal deps so it can be shared by the storage
//! layer, the lifecycle manager, and the background worker.

pub mod clock;
pub mod error;
pub mod order_no;
pub mod payment;
pub mod rate_limit;
pub mod signing;
pub mod status;
pub mod types;
pub mod validation;
