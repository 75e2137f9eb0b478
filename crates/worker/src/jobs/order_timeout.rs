//! Cancels pending orders whose inventory locks have outlived the order timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wq_db::ReservationStore;
use wq_lifecycle::LifecycleManager;

/// Run the order timeout loop every `every` until `cancel` fires.
pub async fn run<S: ReservationStore>(
    manager: Arc<LifecycleManager<S>>,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = every.as_secs(), "Order timeout job started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Order timeout job stopping");
                break;
            }
            _ = interval.tick() => {
                match manager.sweep_expired_orders().await {
                    Ok(report) if report.cancelled_count == 0 && report.failed_count == 0 => {
                        tracing::debug!("Order timeout: nothing to cancel");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Order timeout: sweep failed");
                    }
                }
            }
        }
    }
}
