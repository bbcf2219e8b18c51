//! BDD step definitions for bound IP convergence.

use dayu::resource::{self, ResourceError, ResourceState};
use dayu::resources::BoundIpResource;
use dayu::test_support::ApiAction;
use rstest_bdd_macros::{given, then, when};
use tokio::time::Instant;

use super::test_helpers::{BoundIpContext, CallOutcome, bound_ip, paused_runtime};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn record(mut boundip_context: BoundIpContext, result: Result<(), ResourceError>) -> BoundIpContext {
    boundip_context.outcome = Some(match result {
        Ok(()) => CallOutcome::Success,
        Err(err) => CallOutcome::Failure {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        },
    });
    boundip_context
}

#[given(
    "a BGP instance \"{instance_id}\" polled every {interval:u64} second with a {timeout:u64} second timeout"
)]
fn bgp_instance(
    mut boundip_context: BoundIpContext,
    instance_id: String,
    interval: u64,
    timeout: u64,
) -> BoundIpContext {
    boundip_context.instance_id = instance_id;
    boundip_context.config.read_timeout_secs = timeout;
    boundip_context.config.write_timeout_secs = timeout;
    boundip_context.config.poll_interval_ms = interval.saturating_mul(1000);
    boundip_context.config.retry_interval_ms = interval.saturating_mul(1000);
    boundip_context
}

#[given("the instance reports bound statuses \"{statuses}\"")]
fn instance_reports(boundip_context: BoundIpContext, statuses: String) -> BoundIpContext {
    boundip_context
        .api
        .push_bound_statuses(statuses.split(',').map(str::trim));
    boundip_context
}

#[given("the instance then disappears")]
fn instance_disappears(boundip_context: BoundIpContext) -> BoundIpContext {
    boundip_context.api.push_bound_instance_missing();
    boundip_context
}

#[when("I bind \"{ip}\" to the instance")]
fn bind_ip(mut boundip_context: BoundIpContext, ip: String) -> BoundIpContext {
    let handler = BoundIpResource::new(boundip_context.api.clone(), boundip_context.config.clone());
    let model = bound_ip(&boundip_context.instance_id, &ip);
    let mut state = ResourceState::empty();
    let (result, elapsed) = paused_runtime().block_on(async {
        let started = Instant::now();
        let result = resource::create(&handler, &model, &mut state).await;
        (result, started.elapsed())
    });
    boundip_context.state = state;
    boundip_context.elapsed = elapsed;
    record(boundip_context, result)
}

#[when("I unbind \"{ip}\" from the instance")]
fn unbind_ip(mut boundip_context: BoundIpContext, ip: String) -> BoundIpContext {
    let handler = BoundIpResource::new(boundip_context.api.clone(), boundip_context.config.clone());
    let model = bound_ip(&boundip_context.instance_id, &ip);
    let mut state = ResourceState::tracking(boundip_context.instance_id.clone(), model);
    let (result, elapsed) = paused_runtime().block_on(async {
        let started = Instant::now();
        let result = resource::destroy(&handler, &mut state).await;
        (result, started.elapsed())
    });
    boundip_context.state = state;
    boundip_context.elapsed = elapsed;
    record(boundip_context, result)
}

#[then("binding succeeds with ID \"{id}\"")]
fn binding_succeeds(boundip_context: &BoundIpContext, id: String) -> Result<(), StepError> {
    match boundip_context.outcome.as_ref() {
        Some(CallOutcome::Success) => {}
        other => {
            return Err(StepError::Assertion(format!(
                "expected success, got {other:?}"
            )));
        }
    }
    if boundip_context.state.id() == Some(id.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected tracked id {id}, got {:?}",
            boundip_context.state.id()
        )))
    }
}

#[then("the bound status was fetched {count:u32} times")]
fn status_fetched(boundip_context: &BoundIpContext, count: u32) -> Result<(), StepError> {
    let calls = boundip_context.api.calls(ApiAction::DescribeBgpInstance);
    if calls == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} status fetches, got {calls}"
        )))
    }
}

#[then("exactly {secs:u64} seconds elapsed")]
fn exactly_elapsed(boundip_context: &BoundIpContext, secs: u64) -> Result<(), StepError> {
    if boundip_context.elapsed.as_secs() == secs && boundip_context.elapsed.subsec_nanos() == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {secs}s, took {:?}",
            boundip_context.elapsed
        )))
    }
}

#[then("at least {secs:u64} seconds elapsed")]
fn at_least_elapsed(boundip_context: &BoundIpContext, secs: u64) -> Result<(), StepError> {
    let elapsed = boundip_context.elapsed;
    let interval_ms = boundip_context.config.poll_interval_ms;
    let lower = std::time::Duration::from_secs(secs);
    let upper = lower + std::time::Duration::from_millis(interval_ms);
    if elapsed >= lower && elapsed < upper {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected between {lower:?} and {upper:?}, took {elapsed:?}"
        )))
    }
}

#[then("the operation fails with a timeout mentioning \"{status}\"")]
fn fails_with_timeout(boundip_context: &BoundIpContext, status: String) -> Result<(), StepError> {
    match boundip_context.outcome.as_ref() {
        Some(CallOutcome::Failure {
            message,
            timed_out: true,
        }) if message.contains(&status) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a timeout mentioning {status}, got {other:?}"
        ))),
    }
}

#[then("the operation fails without a timeout")]
fn fails_without_timeout(boundip_context: &BoundIpContext) -> Result<(), StepError> {
    match boundip_context.outcome.as_ref() {
        Some(CallOutcome::Failure {
            timed_out: false, ..
        }) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a non-timeout failure, got {other:?}"
        ))),
    }
}

#[then("the local state still tracks \"{id}\"")]
fn state_kept(boundip_context: &BoundIpContext, id: String) -> Result<(), StepError> {
    if boundip_context.state.id() == Some(id.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected state to keep {id}, got {:?}",
            boundip_context.state.id()
        )))
    }
}
