//! Retry-until-success wrapper for fallible remote calls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::classify::{Classify, ErrorClass};

/// Shortest delay allowed between attempts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Wall-clock timeout plus the fixed delay between attempts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryBudget {
    timeout: Duration,
    interval: Duration,
}

impl RetryBudget {
    /// Creates a budget from a timeout and a requested interval.
    ///
    /// Intervals shorter than [`MIN_INTERVAL`], zero included, are raised to
    /// it so the loops always yield between attempts.
    #[must_use]
    pub const fn new(timeout: Duration, requested: Duration) -> Self {
        let interval = if requested.as_nanos() < MIN_INTERVAL.as_nanos() {
            MIN_INTERVAL
        } else {
            requested
        };
        Self { timeout, interval }
    }

    /// Total time allotted before the loop gives up.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between consecutive attempts or polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Instant after which no attempt may still be running.
    pub(crate) fn deadline(&self, started: Instant) -> Instant {
        started + self.timeout
    }

    /// Time left before `started + timeout`, or `None` once exhausted.
    pub(crate) fn remaining(&self, started: Instant) -> Option<Duration> {
        self.timeout
            .checked_sub(started.elapsed())
            .filter(|left| !left.is_zero())
    }

    /// Next wait, clamped so the loop never sleeps past the deadline.
    pub(crate) fn next_delay(&self, remaining: Duration) -> Duration {
        self.interval.min(remaining)
    }
}

/// Errors surfaced by [`retry_until_success`].
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The call failed with an error classified as fatal.
    #[error(transparent)]
    Fatal(E),
    /// The budget ran out while the call kept failing.
    #[error("gave up after {attempts} attempts within {timeout:?}: {source}")]
    Timeout {
        /// Budget that was exhausted.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the last attempt.
        #[source]
        source: E,
    },
    /// The budget ran out while an attempt was still in flight.
    #[error("gave up after {attempts} attempts within {timeout:?}: the last attempt did not finish")]
    Stalled {
        /// Budget that was exhausted.
        timeout: Duration,
        /// Number of attempts made, the unfinished one included.
        attempts: u32,
        /// Error returned by the attempt before the unfinished one.
        #[source]
        previous: Option<E>,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true when the budget was exhausted.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Stalled { .. })
    }

    /// Returns the last error reported by a finished attempt.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        match self {
            Self::Fatal(source) | Self::Timeout { source, .. } => Some(source),
            Self::Stalled { previous, .. } => previous.as_ref(),
        }
    }
}

/// Invokes `operation` until it succeeds, fails fatally, or `budget` runs out.
///
/// Returns `Ok(Some(value))` on success and `Ok(None)` when the call failed
/// with an error `classifier` marks as acceptable. The wrapped call is
/// resent unchanged, so it must be safe to repeat. Every attempt is cut off
/// at `budget.timeout` after the first one started.
///
/// # Errors
///
/// Returns [`RetryError::Fatal`] for fatal errors, [`RetryError::Timeout`]
/// carrying the last error once the budget is exhausted, and
/// [`RetryError::Stalled`] when an attempt is still running at the deadline.
pub async fn retry_until_success<T, E, C, F, Fut>(
    budget: &RetryBudget,
    classifier: &C,
    mut operation: F,
) -> Result<Option<T>, RetryError<E>>
where
    C: Classify<E> + ?Sized,
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let deadline = budget.deadline(started);
    let mut attempts: u32 = 0;
    let mut previous: Option<E> = None;

    loop {
        attempts = attempts.saturating_add(1);
        let Ok(outcome) = timeout_at(deadline, operation()).await else {
            warn!(attempt = attempts, timeout = ?budget.timeout, "remote call did not finish within budget");
            return Err(RetryError::Stalled {
                timeout: budget.timeout,
                attempts,
                previous,
            });
        };
        let error = match outcome {
            Ok(value) => return Ok(Some(value)),
            Err(error) => error,
        };

        match classifier.classify(&error) {
            ErrorClass::Acceptable => {
                debug!(attempt = attempts, %error, "accepting error as a no-op");
                return Ok(None);
            }
            ErrorClass::Fatal => return Err(RetryError::Fatal(error)),
            ErrorClass::Retryable => {}
        }

        let Some(remaining) = budget.remaining(started) else {
            return Err(RetryError::Timeout {
                timeout: budget.timeout,
                attempts,
                source: error,
            });
        };
        let delay = budget.next_delay(remaining);
        warn!(attempt = attempts, %error, ?delay, "retrying remote call");
        previous = Some(error);
        sleep(delay).await;
    }
}
