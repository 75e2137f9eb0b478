//! Frees seats held by priced registrations nobody paid for in time.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wq_db::ReservationStore;
use wq_lifecycle::LifecycleManager;

pub async fn run<S: ReservationStore>(
    manager: Arc<LifecycleManager<S>>,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        "Registration payment timeout job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Registration payment timeout job stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = manager.sweep_expired_registrations().await {
                    tracing::error!(error = %e, "Registration payment timeout: sweep failed");
                }
            }
        }
    }
}
