//! Daily backstop closing activities whose registration deadline has passed.
//!
//! Reservations already refuse past-deadline activities on their own; this
//! job only converges the stored status for activities nobody touches again.

use std::sync::Arc;

use chrono::{Duration, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use wq_core::types::Timestamp;
use wq_db::ReservationStore;
use wq_lifecycle::LifecycleManager;

/// The first `hour:00` UTC strictly after `now`.
pub fn next_daily_run(now: Timestamp, hour: u32) -> Timestamp {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Sleep until the next `hour:00` UTC, close expired activities, repeat.
pub async fn run<S: ReservationStore>(
    manager: Arc<LifecycleManager<S>>,
    hour: u32,
    cancel: CancellationToken,
) {
    tracing::info!(hour_utc = hour, "Activity deadline job started");

    loop {
        let now = Utc::now();
        let next = next_daily_run(now, hour);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next_run = %next, "Activity deadline: scheduled");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Activity deadline job stopping");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                if let Err(e) = manager.close_expired_activities().await {
                    tracing::error!(error = %e, "Activity deadline: close failed");
                }
            }
        }
    }
}
