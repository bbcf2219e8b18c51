//! Elastic IP attached to a BGP-IP protection instance.

use std::sync::Arc;

use crate::api::{AntiddosApi, AssociateEipRequest, BgpIpInstance, EipAddressRelation, EipTarget};
use crate::classify::CodeClassifier;
use crate::config::ConvergeConfig;
use crate::poll::{PollTarget, wait_for_state};
use crate::resource::{Created, HandlerFuture, ResourceError, ResourceHandler, join_id, split_id};
use crate::throttle::ActionLimiter;

use super::call_api;

/// Returned while the instance's cluster is being rebuilt; the call is a
/// no-op and the binding converges on its own.
const CLUSTER_NOT_FOUND: &str = "InternalError.ClusterNotFound";

const EIP_BIND: &str = "BIND";
const EIP_BINDING: &str = "BINDING";
const EIP_UNBIND: &str = "UNBIND";
const EIP_UNBINDING: &str = "UNBINDING";

const LOAD_BALANCER_PREFIX: &str = "lb-";

const DESCRIBE_ACTION: &str = "DescribeListBGPIPInstances";

/// EIP association between a BGP-IP instance and a CVM or load balancer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EipAttachment {
    /// BGP-IP instance identifier.
    pub instance_id: String,
    /// Elastic IP being attached.
    pub eip: String,
    /// Resource the EIP is attached to.
    pub target: EipTarget,
}

impl EipAttachment {
    /// Identifier under which the attachment is tracked.
    #[must_use]
    pub fn id(&self) -> String {
        join_id(&[&self.instance_id, &self.eip])
    }
}

/// Handler for [`EipAttachment`].
#[derive(Clone, Debug)]
pub struct EipAttachmentResource<A> {
    api: A,
    config: ConvergeConfig,
    classifier: CodeClassifier,
    limiter: Arc<ActionLimiter>,
}

impl<A: AntiddosApi> EipAttachmentResource<A> {
    /// Creates a handler calling `api` with the budgets from `config`.
    #[must_use]
    pub fn new(api: A, config: ConvergeConfig) -> Self {
        let limiter = Arc::new(config.action_limiter());
        Self {
            api,
            config,
            classifier: CodeClassifier::new().accept(CLUSTER_NOT_FOUND),
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

    async fn describe(&self, instance_id: &str) -> Result<Option<BgpIpInstance>, ResourceError> {
        let api = &self.api;
        let found = call_api(
            &self.limiter,
            &self.config.read_budget(),
            &self.classifier,
            DESCRIBE_ACTION,
            &serde_json::json!({ "FilterInstanceId": instance_id }),
            move || api.describe_bgpip_instance(instance_id),
        )
        .await?;
        Ok(found.flatten())
    }

    async fn wait_for_status(
        &self,
        model: &EipAttachment,
        target: &PollTarget,
    ) -> Result<(), ResourceError> {
        let api = &self.api;
        let limiter = self.limiter.as_ref();
        let instance_id = model.instance_id.as_str();
        wait_for_state(
            target,
            &self.config.poll_budget(1),
            &self.classifier,
            move || async move {
                limiter.acquire(DESCRIBE_ACTION).await;
                api.describe_bgpip_instance(instance_id)
                    .await
                    .map(|found| found.and_then(|instance| instance.eip_address_status))
            },
        )
        .await?;
        Ok(())
    }
}

/// Rebuilds the attachment target from what the provider reports.
fn reported_target(relation: &EipAddressRelation) -> Option<EipTarget> {
    let resource_id = relation.eip_bound_rsc_ins.clone()?;
    let region = relation.eip_address_region.clone().unwrap_or_default();
    if resource_id.starts_with(LOAD_BALANCER_PREFIX) {
        Some(EipTarget::LoadBalancer {
            load_balancer_id: resource_id,
            region,
        })
    } else {
        Some(EipTarget::Cvm {
            instance_id: resource_id,
            region,
        })
    }
}

impl<A: AntiddosApi> ResourceHandler for EipAttachmentResource<A> {
    const TYPE_NAME: &'static str = "antiddos_eip_attachment";
    type Model = EipAttachment;

    fn create<'a>(&'a self, model: &'a EipAttachment) -> HandlerFuture<'a, Created<EipAttachment>> {
        Box::pin(async move {
            let request = AssociateEipRequest {
                instance_id: model.instance_id.clone(),
                eip: model.eip.clone(),
                target: model.target.clone(),
            };
            let api = &self.api;
            let body = &request;
            let action = match model.target {
                EipTarget::Cvm { .. } => "AssociateDDoSEipAddress",
                EipTarget::LoadBalancer { .. } => "AssociateDDoSEipLoadBalancer",
            };
            call_api(
                &self.limiter,
                &self.config.write_budget(),
                &self.classifier,
                action,
                body,
                move || api.associate_eip_address(body),
            )
            .await?;
            let target = PollTarget::new(model.id())
                .pending([EIP_BINDING])
                .target([EIP_BIND]);
            self.wait_for_status(model, &target).await?;
            Ok(Created {
                id: model.id(),
                model: model.clone(),
            })
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a str,
        prior: Option<&'a EipAttachment>,
    ) -> HandlerFuture<'a, Option<EipAttachment>> {
        Box::pin(async move {
            let [instance_id, eip] = split_id::<2>(Self::TYPE_NAME, id)?;
            let Some(instance) = self.describe(&instance_id).await? else {
                return Ok(None);
            };
            let status = instance.eip_address_status.as_deref();
            if status.is_none_or(|value| value == EIP_UNBIND)
                || !instance.instance_detail.eip_list.contains(&eip)
            {
                return Ok(None);
            }
            let target = prior.map_or_else(
                || instance.eip_address_info.as_ref().and_then(reported_target),
                |model| Some(model.target.clone()),
            );
            Ok(target.map(|value| EipAttachment {
                instance_id,
                eip,
                target: value,
            }))
        })
    }

    fn delete<'a>(&'a self, _id: &'a str, model: &'a EipAttachment) -> HandlerFuture<'a, ()> {
        Box::pin(async move {
            let api = &self.api;
            let instance_id = model.instance_id.as_str();
            let eip = model.eip.as_str();
            call_api(
                &self.limiter,
                &self.config.write_budget(),
                &self.classifier,
                "DisassociateDDoSEipAddress",
                &serde_json::json!({ "InstanceId": instance_id, "Eip": eip }),
                move || api.disassociate_eip_address(instance_id, eip),
            )
            .await?;
            // A vanished instance no longer holds the EIP.
            let target = PollTarget::new(model.id())
                .pending([EIP_UNBINDING])
                .target([EIP_UNBIND])
                .expect_gone();
            self.wait_for_status(model, &target).await
        })
    }
}
