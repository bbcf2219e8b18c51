//! Devices bound to a BGP protection instance.
//!
//! Binding and unbinding both go through `CreateBoundIP`. The request only
//! starts the change: the instance reports `binding` or `unbinding` until
//! the change lands, after which its bound status returns to `idle`.

use std::sync::Arc;

use crate::api::{AntiddosApi, BoundIpChange, BoundIpInfo, CreateBoundIpRequest};
use crate::classify::CodeClassifier;
use crate::config::ConvergeConfig;
use crate::poll::{PollTarget, wait_for_state};
use crate::resource::{Created, HandlerFuture, ResourceError, ResourceHandler};
use crate::throttle::ActionLimiter;

use super::call_api;

/// Product line used when none is configured.
pub const DEFAULT_BUSINESS: &str = "bgp";

const BOUND_IDLE: &str = "idle";
const BOUND_BINDING: &str = "binding";
const BOUND_UNBINDING: &str = "unbinding";

const DESCRIBE_ACTION: &str = "DescribeListBGPInstances";

/// Devices to keep bound to one BGP instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundIp {
    /// Product line, [`DEFAULT_BUSINESS`] unless overridden.
    pub business: String,
    /// BGP instance identifier; also the tracked identifier.
    pub instance_id: String,
    /// Devices bound to the instance.
    pub bound_devices: Vec<BoundIpInfo>,
    /// Instance whose protection policy is copied onto the devices.
    pub copy_policy: Option<String>,
}

impl BoundIp {
    /// Binds `bound_devices` to `instance_id` under the default business.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, bound_devices: Vec<BoundIpInfo>) -> Self {
        Self {
            business: DEFAULT_BUSINESS.to_owned(),
            instance_id: instance_id.into(),
            bound_devices,
            copy_policy: None,
        }
    }

    fn request(&self, change: BoundIpChange) -> CreateBoundIpRequest {
        CreateBoundIpRequest {
            business: self.business.clone(),
            id: self.instance_id.clone(),
            change,
            copy_policy: self.copy_policy.clone(),
        }
    }
}

/// Handler for [`BoundIp`].
#[derive(Clone, Debug)]
pub struct BoundIpResource<A> {
    api: A,
    config: ConvergeConfig,
    limiter: Arc<ActionLimiter>,
}

impl<A: AntiddosApi> BoundIpResource<A> {
    /// Creates a handler calling `api` with the budgets from `config`.
    #[must_use]
    pub fn new(api: A, config: ConvergeConfig) -> Self {
        let limiter = Arc::new(config.action_limiter());
        Self {
            api,
            config,
            limiter,
        }
    }

    /// Draws API calls from `limiter` instead of a limiter of its own, so
    /// several handlers share the per-action quota.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<ActionLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    async fn send_change(&self, model: &BoundIp, change: BoundIpChange) -> Result<(), ResourceError> {
        let request = model.request(change);
        let api = &self.api;
        let body = &request;
        call_api(
            &self.limiter,
            &self.config.write_budget(),
            &CodeClassifier::new(),
            "CreateBoundIP",
            body,
            move || api.create_bound_ip(body),
        )
        .await?;
        Ok(())
    }

    async fn wait_until_idle(&self, model: &BoundIp, pending: &str) -> Result<(), ResourceError> {
        let target = PollTarget::new(model.instance_id.as_str())
            .pending([pending])
            .target([BOUND_IDLE]);
        let api = &self.api;
        let limiter = self.limiter.as_ref();
        let business = model.business.as_str();
        let instance_id = model.instance_id.as_str();
        wait_for_state(
            &target,
            &self.config.poll_budget(1),
            &CodeClassifier::new(),
            move || async move {
                limiter.acquire(DESCRIBE_ACTION).await;
                api.describe_bgp_instance(business, instance_id)
                    .await
                    .map(|found| found.map(|instance| instance.bound_status))
            },
        )
        .await?;
        Ok(())
    }
}

impl<A: AntiddosApi> ResourceHandler for BoundIpResource<A> {
    const TYPE_NAME: &'static str = "antiddos_boundip";
    type Model = BoundIp;

    fn create<'a>(&'a self, model: &'a BoundIp) -> HandlerFuture<'a, Created<BoundIp>> {
        Box::pin(async move {
            self.send_change(model, BoundIpChange::Bind(model.bound_devices.clone()))
                .await?;
            self.wait_until_idle(model, BOUND_BINDING).await?;
            Ok(Created {
                id: model.instance_id.clone(),
                model: model.clone(),
            })
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a str,
        prior: Option<&'a BoundIp>,
    ) -> HandlerFuture<'a, Option<BoundIp>> {
        Box::pin(async move {
            let business = prior.map_or(DEFAULT_BUSINESS, |model| model.business.as_str());
            let api = &self.api;
            let found = call_api(
                &self.limiter,
                &self.config.read_budget(),
                &CodeClassifier::new(),
                DESCRIBE_ACTION,
                &serde_json::json!({ "Business": business, "FilterInstanceId": id }),
                move || api.describe_bgp_instance(business, id),
            )
            .await?
            .flatten();
            Ok(found.map(|instance| {
                prior.cloned().unwrap_or_else(|| BoundIp {
                    business: business.to_owned(),
                    ..BoundIp::new(instance.instance_detail.instance_id, Vec::new())
                })
            }))
        })
    }

    fn delete<'a>(&'a self, _id: &'a str, model: &'a BoundIp) -> HandlerFuture<'a, ()> {
        Box::pin(async move {
            self.send_change(model, BoundIpChange::Unbind(model.bound_devices.clone()))
                .await?;
            self.wait_until_idle(model, BOUND_UNBINDING).await
        })
    }
}
