//! Shared fixtures and helpers for bound IP scenarios.

use std::time::Duration;

use dayu::api::BoundIpInfo;
use dayu::config::ConvergeConfig;
use dayu::resource::ResourceState;
use dayu::resources::BoundIp;
use dayu::test_support::ScriptedAntiddos;
use rstest::fixture;
use tokio::runtime::{Builder, Runtime};

/// Result of the lifecycle call made by a `when` step.
#[derive(Clone, Debug)]
pub enum CallOutcome {
    Success,
    Failure { message: String, timed_out: bool },
}

#[derive(Clone, Debug)]
pub struct BoundIpContext {
    pub api: ScriptedAntiddos,
    pub config: ConvergeConfig,
    pub instance_id: String,
    pub state: ResourceState<BoundIp>,
    pub outcome: Option<CallOutcome>,
    pub elapsed: Duration,
}

#[fixture]
pub fn boundip_context() -> BoundIpContext {
    BoundIpContext {
        api: ScriptedAntiddos::new(),
        config: ConvergeConfig::default(),
        instance_id: String::new(),
        state: ResourceState::empty(),
        outcome: None,
        elapsed: Duration::ZERO,
    }
}

/// Runtime with a paused clock so timeouts elapse instantly.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("test runtime should build: {err}"))
}

pub fn bound_ip(instance_id: &str, ip: &str) -> BoundIp {
    BoundIp::new(
        instance_id,
        vec![BoundIpInfo {
            ip: ip.to_owned(),
            biz_type: Some(String::from("public")),
            instance_id: Some(String::from("ins-00000001")),
            device_type: Some(String::from("cvm")),
            ..BoundIpInfo::default()
        }],
    )
}
