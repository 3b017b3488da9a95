//! Process-wide rate limits per back-end.
//!
//! A single [`RateLimiterRegistry`] lives for the whole process; every job's
//! dispatcher resolves the same limiter for a back-end name, so the budget
//! is shared by all concurrently running jobs.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::debug;

pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter for one back-end.
pub struct SharedRateLimiter {
    name: String,
    requests_per_minute: u32,
    limiter: DirectRateLimiter,
}

impl SharedRateLimiter {
    pub fn per_minute(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            name: name.into(),
            requests_per_minute: rpm.get(),
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until the shared budget allows one more call.
    pub async fn until_ready(&self) {
        if self.limiter.check().is_err() {
            debug!(backend = %self.name, "Rate limit budget exhausted, waiting");
            self.limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for SharedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRateLimiter")
            .field("name", &self.name)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

/// Limiters keyed by back-end name.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<SharedRateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the limiter for `name`, creating it on first use.
    ///
    /// The quota of the first registration wins.
    pub fn get_or_insert(&self, name: &str, requests_per_minute: u32) -> Arc<SharedRateLimiter> {
        let mut limiters = match self.limiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SharedRateLimiter::per_minute(name, requests_per_minute)))
            .clone()
    }
}
