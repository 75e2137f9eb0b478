//! Batch operations behind the Expiration Sweeper.
//!
//! Each item goes through the same Cancel path as a user-initiated cancel,
//! in its own transaction. A failing item is logged and counted; the rest
//! of the batch carries on.

use serde::Serialize;
use wq_db::ReservationStore;

use crate::error::LifecycleResult;
use crate::manager::LifecycleManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderSweepReport {
    pub cancelled_count: u64,
    pub total_released_stock: i64,
    pub failed_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSweepReport {
    pub cancelled_count: u64,
    pub failed_count: u64,
}

impl<S: ReservationStore> LifecycleManager<S> {
    /// Cancel every `pending` order older than the order timeout.
    pub async fn sweep_expired_orders(&self) -> LifecycleResult<OrderSweepReport> {
        let cutoff = self.clock.now() - self.config.order_timeout;
        let candidates = self.store.find_expired_pending_orders(cutoff).await?;

        let mut report = OrderSweepReport::default();
        for order_id in candidates {
            match self.expire_order(order_id).await {
                Ok(Some(released)) => {
                    report.cancelled_count += 1;
                    report.total_released_stock += released;
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed_count += 1;
                    tracing::error!(order_id, error = %e, "Failed to cancel expired order");
                }
            }
        }

        if report.cancelled_count > 0 || report.failed_count > 0 {
            tracing::info!(
                cancelled = report.cancelled_count,
                released = report.total_released_stock,
                failed = report.failed_count,
                "Order timeout sweep finished"
            );
        }
        Ok(report)
    }

    /// Cancel every unpaid registration past its payment window, freeing the seat.
    pub async fn sweep_expired_registrations(&self) -> LifecycleResult<RegistrationSweepReport> {
        let now = self.clock.now();
        let candidates = self.store.find_expired_unpaid_registrations(now).await?;

        let mut report = RegistrationSweepReport::default();
        for registration_id in candidates {
            match self.expire_registration(registration_id).await {
                Ok(true) => report.cancelled_count += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed_count += 1;
                    tracing::error!(
                        registration_id,
                        error = %e,
                        "Failed to cancel expired registration"
                    );
                }
            }
        }

        if report.cancelled_count > 0 || report.failed_count > 0 {
            tracing::info!(
                cancelled = report.cancelled_count,
                failed = report.failed_count,
                "Registration payment sweep finished"
            );
        }
        Ok(report)
    }

    /// Backstop: close registration on live activities whose deadline passed.
    pub async fn close_expired_activities(&self) -> LifecycleResult<u64> {
        let closed = self
            .store
            .close_expired_activities(self.clock.now())
            .await?;
        if closed > 0 {
            tracing::info!(closed, "Closed activities past their registration deadline");
        }
        Ok(closed)
    }
}
