//! State poller that waits for a remote entity to converge after a mutation.
//!
//! A mutation call returning success only means the request was accepted;
//! the entity's reported status may lag behind. [`wait_for_state`] fetches
//! the status repeatedly until it lands in the target set, the entity
//! disappears, a failure status is reported, or the budget runs out.

use std::collections::BTreeSet;
use std::future::Future;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::classify::{Classify, ErrorClass};
use crate::retry::RetryBudget;

/// Entity whose status is polled, plus the statuses that end the wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollTarget {
    /// Provider identifier of the polled entity.
    pub id: String,
    /// Statuses meaning the operation is still in progress. Any other
    /// non-target status also keeps the wait going but is logged as
    /// unexpected.
    pub pending: BTreeSet<String>,
    /// Statuses meaning the operation completed successfully.
    pub target: BTreeSet<String>,
    /// Statuses meaning the operation definitively failed. Empty for the
    /// built-in resources, whose APIs report no failure status.
    pub failed: BTreeSet<String>,
    /// Whether a vanished entity counts as success.
    pub expect_gone: bool,
}

impl PollTarget {
    /// Starts a target for `id` with empty status sets.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pending: BTreeSet::new(),
            target: BTreeSet::new(),
            failed: BTreeSet::new(),
            expect_gone: false,
        }
    }

    /// Adds in-progress statuses.
    #[must_use]
    pub fn pending<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.extend(statuses.into_iter().map(Into::into));
        self
    }

    /// Adds success statuses.
    #[must_use]
    pub fn target<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target.extend(statuses.into_iter().map(Into::into));
        self
    }

    /// Adds definitive failure statuses.
    #[must_use]
    pub fn failed<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failed.extend(statuses.into_iter().map(Into::into));
        self
    }

    /// Treats a vanished entity as the successful outcome.
    #[must_use]
    pub const fn expect_gone(mut self) -> Self {
        self.expect_gone = true;
        self
    }

    /// Classifies one observation. Elapsed time is handled by the caller.
    #[must_use]
    pub fn observe(&self, status: Option<&str>) -> PollState {
        match status {
            None => PollState::NotFound,
            Some(value) if self.target.contains(value) => PollState::Reached,
            Some(value) if self.failed.contains(value) => PollState::Failed,
            Some(_) => PollState::Pending,
        }
    }
}

/// States of the convergence state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollState {
    /// Still waiting; the initial state.
    Pending,
    /// A target status was observed.
    Reached,
    /// The budget elapsed before a target status was observed.
    TimedOut,
    /// The entity is no longer reported by the provider.
    NotFound,
    /// A failure status was observed.
    Failed,
}

impl PollState {
    /// Returns true for states the machine never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Errors surfaced by [`wait_for_state`].
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The entity disappeared while polling.
    #[error("{id} not found while waiting for {expected}")]
    NotFound {
        /// Provider identifier.
        id: String,
        /// Target statuses, comma separated.
        expected: String,
    },
    /// The budget ran out before a target status was observed.
    #[error("timeout waiting for {id} to reach {expected} (last status: {})", .last_status.as_deref().unwrap_or("unknown"))]
    TimedOut {
        /// Provider identifier.
        id: String,
        /// Target statuses, comma separated.
        expected: String,
        /// Last status fetched successfully, if any.
        last_status: Option<String>,
    },
    /// A failure status was reported.
    #[error("{id} entered failure status {status}")]
    Failed {
        /// Provider identifier.
        id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// A status fetch failed with a fatal error.
    #[error("failed to fetch status of {id}: {source}")]
    Fetch {
        /// Provider identifier.
        id: String,
        /// Fetch error.
        #[source]
        source: E,
    },
}

impl<E> WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true when the budget was exhausted.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Terminal state corresponding to this error.
    #[must_use]
    pub const fn state(&self) -> PollState {
        match self {
            Self::NotFound { .. } => PollState::NotFound,
            Self::TimedOut { .. } => PollState::TimedOut,
            Self::Failed { .. } | Self::Fetch { .. } => PollState::Failed,
        }
    }
}

/// Polls `fetch` until `target` converges.
///
/// `fetch` returns `Ok(Some(status))` for a live entity and `Ok(None)` when
/// the provider no longer reports it. Fetch errors `classifier` marks as
/// retryable or acceptable count as "not yet reached". The first fetch runs
/// immediately; subsequent fetches are spaced by `budget.interval`, clamped
/// so the total wait never exceeds `budget.timeout` by more than one
/// interval. A fetch still running at the deadline is abandoned.
///
/// Returns the final status, or an empty string when `target.expect_gone`
/// is set and the entity vanished.
///
/// # Errors
///
/// Returns [`WaitError::NotFound`] when the entity vanished unexpectedly,
/// [`WaitError::Failed`] on a failure status, [`WaitError::Fetch`] when a
/// fetch fails fatally, and [`WaitError::TimedOut`] when the budget is
/// exhausted or the last fetch did not finish in time.
pub async fn wait_for_state<E, C, F, Fut>(
    target: &PollTarget,
    budget: &RetryBudget,
    classifier: &C,
    mut fetch: F,
) -> Result<String, WaitError<E>>
where
    C: Classify<E> + ?Sized,
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>, E>>,
{
    let started = Instant::now();
    let deadline = budget.deadline(started);
    let mut last_status: Option<String> = None;
    let mut polls: u32 = 0;

    loop {
        polls = polls.saturating_add(1);
        let Ok(fetched) = timeout_at(deadline, fetch()).await else {
            warn!(id = %target.id, polls, "status fetch did not finish within budget");
            return Err(WaitError::TimedOut {
                id: target.id.clone(),
                expected: join(&target.target),
                last_status,
            });
        };
        match fetched {
            Ok(status) => match target.observe(status.as_deref()) {
                PollState::Reached => {
                    debug!(id = %target.id, polls, ?status, "target status reached");
                    return Ok(status.unwrap_or_default());
                }
                PollState::NotFound if target.expect_gone => {
                    debug!(id = %target.id, polls, "entity gone as expected");
                    return Ok(String::new());
                }
                PollState::NotFound => {
                    return Err(WaitError::NotFound {
                        id: target.id.clone(),
                        expected: join(&target.target),
                    });
                }
                PollState::Failed => {
                    return Err(WaitError::Failed {
                        id: target.id.clone(),
                        status: status.unwrap_or_default(),
                    });
                }
                PollState::Pending | PollState::TimedOut => {
                    if status
                        .as_deref()
                        .is_some_and(|value| target.pending.contains(value))
                    {
                        debug!(id = %target.id, polls, ?status, "still converging");
                    } else {
                        warn!(id = %target.id, polls, ?status, "unexpected status; still waiting");
                    }
                    last_status = status;
                }
            },
            Err(error) => match classifier.classify(&error) {
                ErrorClass::Fatal => {
                    return Err(WaitError::Fetch {
                        id: target.id.clone(),
                        source: error,
                    });
                }
                ErrorClass::Retryable | ErrorClass::Acceptable => {
                    warn!(id = %target.id, polls, %error, "status fetch failed; polling again");
                }
            },
        }

        let Some(remaining) = budget.remaining(started) else {
            return Err(WaitError::TimedOut {
                id: target.id.clone(),
                expected: join(&target.target),
                last_status,
            });
        };
        sleep(budget.next_delay(remaining)).await;
    }
}

fn join(statuses: &BTreeSet<String>) -> String {
    statuses
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::*;

    #[derive(Debug, Error, Eq, PartialEq)]
    enum FetchError {
        #[error("network blip")]
        Blip,
        #[error("access denied")]
        Denied,
    }

    fn classify(error: &FetchError) -> ErrorClass {
        match error {
            FetchError::Blip => ErrorClass::Retryable,
            FetchError::Denied => ErrorClass::Fatal,
        }
    }

    type Observation = Result<Option<String>, FetchError>;

    /// Replays scripted observations, repeating the last one once drained.
    struct Script {
        queue: RefCell<VecDeque<Observation>>,
        calls: Cell<u32>,
    }

    impl Script {
        fn statuses(statuses: &[&str]) -> Self {
            Self::observations(
                statuses
                    .iter()
                    .map(|status| Ok(Some((*status).to_owned())))
                    .collect(),
            )
        }

        fn observations(observations: Vec<Observation>) -> Self {
            Self {
                queue: RefCell::new(observations.into()),
                calls: Cell::new(0),
            }
        }

        fn next(&self) -> Observation {
            self.calls.set(self.calls.get() + 1);
            let mut queue = self.queue.borrow_mut();
            if queue.len() > 1 {
                queue.pop_front().unwrap_or(Ok(None))
            } else {
                match queue.front() {
                    Some(Ok(status)) => Ok(status.clone()),
                    Some(Err(FetchError::Blip)) => Err(FetchError::Blip),
                    Some(Err(FetchError::Denied)) => Err(FetchError::Denied),
                    None => Ok(None),
                }
            }
        }
    }

    #[fixture]
    fn budget() -> RetryBudget {
        RetryBudget::new(Duration::from_secs(10), Duration::from_secs(1))
    }

    #[fixture]
    fn binding_target() -> PollTarget {
        PollTarget::new("bgp-000000xe")
            .pending(["binding"])
            .target(["idle"])
    }

    async fn run(
        target: &PollTarget,
        budget: &RetryBudget,
        script: &Script,
    ) -> Result<String, WaitError<FetchError>> {
        wait_for_state(target, budget, &classify, || {
            let observation = script.next();
            async move { observation }
        })
        .await
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn converges_after_pending_statuses(budget: RetryBudget, binding_target: PollTarget) {
        let script = Script::statuses(&["binding", "binding", "idle"]);
        let started = Instant::now();

        let status = run(&binding_target, &budget, &script).await;

        assert_eq!(status.ok().as_deref(), Some("idle"));
        assert_eq!(script.calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn unknown_statuses_keep_polling(budget: RetryBudget, binding_target: PollTarget) {
        let script = Script::statuses(&["queued", "binding", "idle"]);

        let status = run(&binding_target, &budget, &script).await;

        assert_eq!(status.ok().as_deref(), Some("idle"));
        assert_eq!(script.calls.get(), 3);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn times_out_with_bounded_overshoot(budget: RetryBudget) {
        let target = PollTarget::new("bgp-000000xe")
            .pending(["unbinding"])
            .target(["idle"]);
        let script = Script::statuses(&["unbinding"]);
        let started = Instant::now();

        let result = run(&target, &budget, &script).await;

        let elapsed = started.elapsed();
        let err = result.expect_err("pending forever must time out");
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert_eq!(err.state(), PollState::TimedOut);
        assert!(err.to_string().contains("unbinding"), "missing last status: {err}");
        assert!(elapsed >= budget.timeout(), "returned early: {elapsed:?}");
        assert!(elapsed < budget.timeout() + budget.interval(), "overshoot: {elapsed:?}");
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn hung_fetch_is_abandoned_at_the_deadline(
        budget: RetryBudget,
        binding_target: PollTarget,
    ) {
        let calls = Cell::new(0_u32);
        let started = Instant::now();

        let result = wait_for_state(&binding_target, &budget, &classify, || {
            calls.set(calls.get() + 1);
            let first = calls.get() == 1;
            async move {
                if first {
                    Ok(Some(String::from("binding")))
                } else {
                    std::future::pending::<Observation>().await
                }
            }
        })
        .await;

        assert!(
            matches!(
                &result,
                Err(WaitError::TimedOut { last_status: Some(status), .. }) if status == "binding"
            ),
            "unexpected outcome: {result:?}"
        );
        assert_eq!(started.elapsed(), budget.timeout());
        assert_eq!(calls.get(), 2);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn not_found_short_circuits(budget: RetryBudget, binding_target: PollTarget) {
        let script = Script::observations(vec![Ok(Some(String::from("binding"))), Ok(None)]);

        let result = run(&binding_target, &budget, &script).await;

        let err = result.expect_err("vanished entity must fail");
        assert_eq!(err.state(), PollState::NotFound);
        assert_eq!(script.calls.get(), 2);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn expected_disappearance_is_success(budget: RetryBudget) {
        let target = PollTarget::new("bgp-000000xe")
            .pending(["unbinding"])
            .expect_gone();
        let script = Script::observations(vec![Ok(Some(String::from("unbinding"))), Ok(None)]);

        let status = run(&target, &budget, &script).await;

        assert_eq!(status.ok().as_deref(), Some(""));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn failure_status_terminates(budget: RetryBudget) {
        let target = PollTarget::new("task-1")
            .pending(["running"])
            .target(["success"])
            .failed(["failed"]);
        let script = Script::statuses(&["running", "failed"]);

        let result = run(&target, &budget, &script).await;

        assert!(
            matches!(&result, Err(WaitError::Failed { status, .. }) if status == "failed"),
            "unexpected outcome: {result:?}"
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn transient_fetch_errors_are_retried(budget: RetryBudget, binding_target: PollTarget) {
        let script = Script::observations(vec![
            Err(FetchError::Blip),
            Ok(Some(String::from("binding"))),
            Ok(Some(String::from("idle"))),
        ]);

        let status = run(&binding_target, &budget, &script).await;

        assert_eq!(status.ok().as_deref(), Some("idle"));
        assert_eq!(script.calls.get(), 3);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn fatal_fetch_errors_stop_polling(budget: RetryBudget, binding_target: PollTarget) {
        let script = Script::observations(vec![Err(FetchError::Denied)]);

        let result = run(&binding_target, &budget, &script).await;

        assert!(
            matches!(result, Err(WaitError::Fetch { source: FetchError::Denied, .. })),
            "unexpected outcome: {result:?}"
        );
        assert_eq!(script.calls.get(), 1);
    }

    #[rstest]
    #[case::pending(Some("binding"), PollState::Pending)]
    #[case::reached(Some("idle"), PollState::Reached)]
    #[case::missing(None, PollState::NotFound)]
    fn observe_maps_statuses(
        binding_target: PollTarget,
        #[case] status: Option<&str>,
        #[case] expected: PollState,
    ) {
        assert_eq!(binding_target.observe(status), expected);
        assert_eq!(expected.is_terminal(), expected != PollState::Pending);
    }
}
