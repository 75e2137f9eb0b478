//! Expiration Sweeper.
//!
//! Long-running jobs that drive stale holds through the lifecycle manager:
//! unpaid orders past their timeout, priced registrations past their payment
//! window, and (once a day) activities past their registration deadline.

pub mod config;
pub mod jobs;

pub use config::WorkerConfig;
