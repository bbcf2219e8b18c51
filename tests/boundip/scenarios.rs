//! BDD scenarios for bound IP convergence.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BoundIpContext, boundip_context};

#[scenario(
    path = "tests/features/boundip.feature",
    name = "Bind converges once the instance reports idle"
)]
fn scenario_bind_converges(boundip_context: BoundIpContext) {
    let _ = boundip_context;
}

#[scenario(
    path = "tests/features/boundip.feature",
    name = "Unbind that never settles times out and keeps state"
)]
fn scenario_unbind_times_out(boundip_context: BoundIpContext) {
    let _ = boundip_context;
}

#[scenario(
    path = "tests/features/boundip.feature",
    name = "Instance vanishing during bind is reported"
)]
fn scenario_instance_vanishes(boundip_context: BoundIpContext) {
    let _ = boundip_context;
}
