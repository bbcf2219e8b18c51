//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::api::{
    AntiddosApi, ApiError, ApiFuture, AssociateEipRequest, BgpInstance, BgpIpInstance,
    CreateBoundIpRequest, EipAddressRelation, InstanceDetail, ModifyLevelRequest,
    ModifyThresholdRequest, PacketFilterConfig, PacketFilterRelation, ProtectThresholdRelation,
};

/// API actions recorded by [`ScriptedAntiddos`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ApiAction {
    /// `CreateBoundIP`.
    CreateBoundIp,
    /// `DescribeListBGPInstances`.
    DescribeBgpInstance,
    /// `AssociateDDoSEipAddress` and `AssociateDDoSEipLoadBalancer`.
    AssociateEip,
    /// `DisassociateDDoSEipAddress`.
    DisassociateEip,
    /// `DescribeListBGPIPInstances`.
    DescribeBgpIpInstance,
    /// `CreatePacketFilterConfig`.
    CreatePacketFilter,
    /// `DescribeListPacketFilterConfig`.
    DescribePacketFilters,
    /// `DeletePacketFilterConfig`.
    DeletePacketFilter,
    /// `ModifyDDoSThreshold`.
    ModifyThreshold,
    /// `ModifyDDoSLevel`.
    ModifyLevel,
    /// `DescribeListProtectThresholdConfig`.
    DescribeProtectThreshold,
}

/// Status sequence that repeats its last entry once drained.
///
/// `None` entries mean the entity is not reported at all.
#[derive(Debug, Default)]
struct StatusScript {
    queue: VecDeque<Option<String>>,
    last: Option<String>,
}

impl StatusScript {
    fn push(&mut self, status: Option<String>) {
        self.queue.push_back(status);
    }

    fn next(&mut self) -> Option<String> {
        if let Some(upcoming) = self.queue.pop_front() {
            self.last = upcoming;
        }
        self.last.clone()
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: BTreeMap<ApiAction, u32>,
    failures: BTreeMap<ApiAction, VecDeque<ApiError>>,
    sticky_failures: BTreeMap<ApiAction, ApiError>,
    bound_status: StatusScript,
    eip_status: StatusScript,
    eip_binding: Option<AssociateEipRequest>,
    bound_requests: Vec<CreateBoundIpRequest>,
    packet_filters: Vec<PacketFilterRelation>,
    created_filters: u32,
    protect_threshold: Option<ProtectThresholdRelation>,
    threshold_requests: Vec<ModifyThresholdRequest>,
    level_requests: Vec<ModifyLevelRequest>,
}

impl ScriptState {
    /// Counts the call and returns the next scripted failure, if any.
    fn record(&mut self, action: ApiAction) -> Result<(), ApiError> {
        let count = self.calls.entry(action).or_default();
        *count = count.saturating_add(1);
        if let Some(error) = self
            .failures
            .get_mut(&action)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        self.sticky_failures
            .get(&action)
            .map_or(Ok(()), |error| Err(error.clone()))
    }

    fn bgpip_instance(&mut self, instance_id: &str) -> Option<BgpIpInstance> {
        let status = self.eip_status.next()?;
        let binding = self.eip_binding.as_ref();
        Some(BgpIpInstance {
            instance_detail: InstanceDetail {
                instance_id: instance_id.to_owned(),
                eip_list: binding.map(|request| request.eip.clone()).into_iter().collect(),
            },
            eip_address_status: Some(status),
            eip_address_info: binding.map(|request| EipAddressRelation {
                eip_address_region: Some(request.target.region().to_owned()),
                eip_bound_rsc_ins: Some(request.target.resource_id().to_owned()),
            }),
        })
    }

    fn threshold_entry(&mut self, instance_id: &str) -> &mut ProtectThresholdRelation {
        self.protect_threshold
            .get_or_insert_with(|| ProtectThresholdRelation {
                instance_detail_list: vec![InstanceDetail {
                    instance_id: instance_id.to_owned(),
                    eip_list: Vec::new(),
                }],
                ..ProtectThresholdRelation::default()
            })
    }
}

/// Scripted in-memory [`AntiddosApi`].
///
/// Clones share state, so a test keeps one handle for scripting and
/// assertions while the resource under test owns another. Status scripts
/// repeat their final entry, which lets a single `"unbinding"` model an
/// entity stuck in that state.
#[derive(Clone, Debug, Default)]
pub struct ScriptedAntiddos {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedAntiddos {
    /// Creates a double with no scripted statuses or failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut ScriptState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state)
    }

    /// Queues bound statuses reported by `DescribeListBGPInstances`.
    pub fn push_bound_statuses<I, S>(&self, statuses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_state(|state| {
            for status in statuses {
                state.bound_status.push(Some(status.into()));
            }
        });
    }

    /// Queues a poll on which the BGP instance is not reported.
    pub fn push_bound_instance_missing(&self) {
        self.with_state(|state| state.bound_status.push(None));
    }

    /// Queues EIP statuses reported by `DescribeListBGPIPInstances`.
    pub fn push_eip_statuses<I, S>(&self, statuses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_state(|state| {
            for status in statuses {
                state.eip_status.push(Some(status.into()));
            }
        });
    }

    /// Queues a poll on which the BGP-IP instance is not reported.
    pub fn push_eip_instance_missing(&self) {
        self.with_state(|state| state.eip_status.push(None));
    }

    /// Records an existing EIP binding, as if associated out of band.
    pub fn set_eip_binding(&self, request: AssociateEipRequest) {
        self.with_state(|state| state.eip_binding = Some(request));
    }

    /// Adds a rule to the packet-filter listing.
    pub fn seed_packet_filter(&self, relation: PacketFilterRelation) {
        self.with_state(|state| state.packet_filters.push(relation));
    }

    /// Fails the next call of `action` with `error`.
    pub fn push_failure(&self, action: ApiAction, error: ApiError) {
        self.with_state(|state| {
            state.failures.entry(action).or_default().push_back(error);
        });
    }

    /// Fails every call of `action` with `error` once queued failures drain.
    pub fn fail_always(&self, action: ApiAction, error: ApiError) {
        self.with_state(|state| {
            state.sticky_failures.insert(action, error);
        });
    }

    /// Number of calls made to `action`.
    #[must_use]
    pub fn calls(&self, action: ApiAction) -> u32 {
        self.with_state(|state| state.calls.get(&action).copied().unwrap_or_default())
    }

    /// `CreateBoundIP` requests received so far.
    #[must_use]
    pub fn bound_requests(&self) -> Vec<CreateBoundIpRequest> {
        self.with_state(|state| state.bound_requests.clone())
    }

    /// Rules currently listed.
    #[must_use]
    pub fn packet_filters(&self) -> Vec<PacketFilterRelation> {
        self.with_state(|state| state.packet_filters.clone())
    }

    /// `ModifyDDoSThreshold` requests received so far.
    #[must_use]
    pub fn threshold_requests(&self) -> Vec<ModifyThresholdRequest> {
        self.with_state(|state| state.threshold_requests.clone())
    }

    /// `ModifyDDoSLevel` requests received so far.
    #[must_use]
    pub fn level_requests(&self) -> Vec<ModifyLevelRequest> {
        self.with_state(|state| state.level_requests.clone())
    }

    fn respond<'a, T: Send + 'a>(
        &self,
        action: ApiAction,
        outcome: impl FnOnce(&mut ScriptState) -> T,
    ) -> ApiFuture<'a, T> {
        let result = self.with_state(|state| state.record(action).map(|()| outcome(state)));
        Box::pin(std::future::ready(result))
    }
}

impl AntiddosApi for ScriptedAntiddos {
    fn create_bound_ip<'a>(&'a self, request: &'a CreateBoundIpRequest) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::CreateBoundIp, |state| {
            state.bound_requests.push(request.clone());
        })
    }

    fn describe_bgp_instance<'a>(
        &'a self,
        _business: &'a str,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Option<BgpInstance>> {
        self.respond(ApiAction::DescribeBgpInstance, |state| {
            state.bound_status.next().map(|bound_status| BgpInstance {
                instance_detail: InstanceDetail {
                    instance_id: instance_id.to_owned(),
                    eip_list: Vec::new(),
                },
                status: String::from("idle"),
                bound_status,
            })
        })
    }

    fn associate_eip_address<'a>(&'a self, request: &'a AssociateEipRequest) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::AssociateEip, |state| {
            state.eip_binding = Some(request.clone());
        })
    }

    fn disassociate_eip_address<'a>(
        &'a self,
        _instance_id: &'a str,
        _eip: &'a str,
    ) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::DisassociateEip, |_| ())
    }

    fn describe_bgpip_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Option<BgpIpInstance>> {
        self.respond(ApiAction::DescribeBgpIpInstance, |state| {
            state.bgpip_instance(instance_id)
        })
    }

    fn create_packet_filter_config<'a>(
        &'a self,
        instance_id: &'a str,
        config: &'a PacketFilterConfig,
    ) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::CreatePacketFilter, |state| {
            state.created_filters = state.created_filters.saturating_add(1);
            state.packet_filters.push(PacketFilterRelation {
                packet_filter_config: PacketFilterConfig {
                    id: Some(format!("pf-{:04}", state.created_filters)),
                    ..config.clone()
                },
                instance_detail_list: vec![InstanceDetail {
                    instance_id: instance_id.to_owned(),
                    eip_list: Vec::new(),
                }],
                modify_time: None,
            });
        })
    }

    fn describe_packet_filter_configs<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Vec<PacketFilterRelation>> {
        self.respond(ApiAction::DescribePacketFilters, |state| {
            state
                .packet_filters
                .iter()
                .filter(|relation| relation.applies_to(instance_id))
                .cloned()
                .collect()
        })
    }

    fn delete_packet_filter_config<'a>(
        &'a self,
        instance_id: &'a str,
        config: &'a PacketFilterConfig,
    ) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::DeletePacketFilter, |state| {
            state.packet_filters.retain(|relation| {
                !(relation.applies_to(instance_id)
                    && relation.packet_filter_config.id == config.id)
            });
        })
    }

    fn modify_ddos_threshold<'a>(
        &'a self,
        request: &'a ModifyThresholdRequest,
    ) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::ModifyThreshold, |state| {
            state.threshold_requests.push(request.clone());
            state.threshold_entry(&request.id).ddos_threshold = request.threshold;
        })
    }

    fn modify_ddos_level<'a>(&'a self, request: &'a ModifyLevelRequest) -> ApiFuture<'a, ()> {
        self.respond(ApiAction::ModifyLevel, |state| {
            state.level_requests.push(request.clone());
            state.threshold_entry(&request.id).ddos_level = request.ddos_level.clone();
        })
    }

    fn describe_protect_threshold<'a>(
        &'a self,
        _instance_id: &'a str,
    ) -> ApiFuture<'a, Option<ProtectThresholdRelation>> {
        self.respond(ApiAction::DescribeProtectThreshold, |state| {
            state.protect_threshold.clone()
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn status_scripts_repeat_the_last_entry() {
        let api = ScriptedAntiddos::new();
        api.push_bound_statuses(["binding", "idle"]);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let found = api
                .describe_bgp_instance("bgp", "bgp-1")
                .await
                .expect("describe should succeed");
            seen.push(found.map(|instance| instance.bound_status));
        }
        assert_eq!(
            seen,
            vec![
                Some(String::from("binding")),
                Some(String::from("idle")),
                Some(String::from("idle")),
            ]
        );
        assert_eq!(api.calls(ApiAction::DescribeBgpInstance), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn queued_failures_precede_sticky_ones() {
        let api = ScriptedAntiddos::new();
        api.push_failure(ApiAction::ModifyLevel, ApiError::transport("reset"));
        api.fail_always(ApiAction::ModifyLevel, ApiError::service("InternalError", "down"));
        let request = ModifyLevelRequest {
            business: String::from("bgpip"),
            id: String::from("bgpip-1"),
            method: String::from("set"),
            ddos_level: String::from("high"),
        };

        let first = api.modify_ddos_level(&request).await;
        let second = api.modify_ddos_level(&request).await;

        assert_eq!(first, Err(ApiError::transport("reset")));
        assert_eq!(second, Err(ApiError::service("InternalError", "down")));
        assert!(api.level_requests().is_empty());
    }
}
