//! Background sweep jobs.
//!
//! Each job runs until its [`CancellationToken`](tokio_util::sync::CancellationToken)
//! fires. A failing pass is logged and the next one runs on schedule.

pub mod activity_deadline;
pub mod order_timeout;
pub mod registration_timeout;
