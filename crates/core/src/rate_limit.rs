//! Per-key request counter guarding the hot reservation paths.
//!
//! Each key owns a counter cell whose time-to-live is the rule's window,
//! measured from the first hit. A call is allowed iff the post-increment
//! count is within the limit. Expired cells are replaced on the next hit and
//! swept out wholesale once the table grows past [`MAX_TRACKED_KEYS`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::types::Timestamp;

/// Upper bound on live cells before expired ones are purged.
pub const MAX_TRACKED_KEYS: usize = 10_000;

/// A `(limit, window)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn new(limit: u32, window_secs: i64) -> Self {
        Self {
            limit,
            window: Duration::seconds(window_secs),
        }
    }

    /// Order creation and seat registration: 10 per minute.
    pub const ORDER_CREATE: Self = Self::new(10, 60);

    /// Payment attempts: 20 per minute.
    pub const ORDER_PAY: Self = Self::new(20, 60);

    /// Read paths: 100 per minute.
    pub const QUERY: Self = Self::new(100, 60);
}

/// Key builders so every call site spells keys the same way.
pub mod keys {
    pub fn order_create(user_id: &str) -> String {
        format!("order:create:{user_id}")
    }

    pub fn order_pay(user_id: &str) -> String {
        format!("order:pay:{user_id}")
    }

    pub fn query(user_id: &str) -> String {
        format!("order:query:{user_id}")
    }

    pub fn activity_register(user_id: &str) -> String {
        format!("activity:register:{user_id}")
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    count: u32,
    expires_at: Timestamp,
}

/// In-process rate limiter shared by all request paths.
pub struct RateLimiter {
    cells: Mutex<HashMap<String, Cell>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Count one hit against `key` and report whether it is allowed.
    pub fn check(&self, key: &str, rule: RateLimitRule) -> bool {
        let now = self.clock.now();
        let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());

        if cells.len() >= MAX_TRACKED_KEYS {
            cells.retain(|_, cell| cell.expires_at > now);
        }

        let cell = cells
            .entry(key.to_string())
            .and_modify(|cell| {
                if cell.expires_at <= now {
                    *cell = Cell {
                        count: 0,
                        expires_at: now + rule.window,
                    };
                }
            })
            .or_insert(Cell {
                count: 0,
                expires_at: now + rule.window,
            });

        cell.count = cell.count.saturating_add(1);
        if cell.count == 1 {
            tracing::debug!(
                key,
                limit = rule.limit,
                window_secs = rule.window.num_seconds(),
                "Rate limit cell created"
            );
        }

        let allowed = cell.count <= rule.limit;
        if !allowed {
            tracing::warn!(key, current = cell.count, limit = rule.limit, "Request rate limited");
        }
        allowed
    }

    /// Like [`check`](Self::check) but as a `Result` for `?` at call sites.
    pub fn ensure(&self, key: &str, rule: RateLimitRule) -> Result<(), CoreError> {
        if self.check(key, rule) {
            Ok(())
        } else {
            Err(CoreError::RateLimited {
                key: key.to_string(),
            })
        }
    }

    /// Current count for `key` (0 if absent or expired).
    pub fn count(&self, key: &str) -> u32 {
        let now = self.clock.now();
        let cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        cells
            .get(key)
            .filter(|cell| cell.expires_at > now)
            .map_or(0, |cell| cell.count)
    }

    /// Drop the cell for `key` (admin or test use).
    pub fn reset(&self, key: &str) {
        self.cells
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
        tracing::info!(key, "Rate limit counter reset");
    }
}
