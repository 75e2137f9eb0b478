use std::sync::Arc;

use wq_core::clock::{Clock, SystemClock};
use wq_core::payment::{MockPaymentProvider, PaymentProvider};
use wq_core::rate_limit::{RateLimitRule, RateLimiter};
use wq_core::signing::AmountSigner;
use wq_db::ReservationStore;

use crate::config::LifecycleConfig;
use crate::error::LifecycleResult;

/// Orchestrates both hold flows over a [`ReservationStore`].
///
/// Cheap to share behind an `Arc`; all interior state (the rate limiter's
/// cells) is synchronised.
pub struct LifecycleManager<S: ReservationStore> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) signer: AmountSigner,
    pub(crate) limiter: RateLimiter,
    pub(crate) payments: Arc<dyn PaymentProvider>,
    pub(crate) config: LifecycleConfig,
}

impl<S: ReservationStore> LifecycleManager<S> {
    /// A manager on the system clock with the mock payment provider.
    pub fn new(store: Arc<S>, config: LifecycleConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            signer: AmountSigner::new(config.signature_secret.clone(), config.signature_tolerance),
            limiter: RateLimiter::new(Arc::clone(&clock)),
            clock,
            payments: Arc::new(MockPaymentProvider),
            config,
        }
    }

    /// Replace the clock. The rate limiter follows the same clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = RateLimiter::new(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn with_payment_provider(mut self, payments: Arc<dyn PaymentProvider>) -> Self {
        self.payments = payments;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn signer(&self) -> &AmountSigner {
        &self.signer
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub(crate) fn rate_limit(&self, key: &str, rule: RateLimitRule) -> LifecycleResult<()> {
        Ok(self.limiter.ensure(key, rule)?)
    }
}
