//! Client-side throttling of Anti-DDoS API actions.
//!
//! The service enforces a request quota per action, so each action name gets
//! its own bucket. A caller that has used up a bucket waits until the next
//! slot opens instead of sending a request the service would reject with
//! `RequestLimitExceeded`.

use std::fmt;
use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::debug;

/// Calls allowed per second for each action unless configured otherwise.
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 20;

/// Keyed rate limiter with one bucket per API action.
///
/// Share one limiter between handlers (wrapped in an `Arc`) so that they
/// draw from the same buckets.
pub struct ActionLimiter {
    per_second: NonZeroU32,
    buckets: DefaultKeyedRateLimiter<&'static str>,
}

impl ActionLimiter {
    /// Allows `per_second` calls a second per action, with bursts of the
    /// same size.
    #[must_use]
    pub fn per_second(per_second: NonZeroU32) -> Self {
        Self {
            per_second,
            buckets: RateLimiter::keyed(Quota::per_second(per_second)),
        }
    }

    /// Waits until `action` may be called again and takes the slot.
    pub async fn acquire(&self, action: &'static str) {
        if self.buckets.check_key(&action).is_ok() {
            return;
        }
        debug!(action, per_second = self.per_second.get(), "throttling api action");
        self.buckets.until_key_ready(&action).await;
    }
}

impl fmt::Debug for ActionLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionLimiter")
            .field("per_second", &self.per_second)
            .finish_non_exhaustive()
    }
}
