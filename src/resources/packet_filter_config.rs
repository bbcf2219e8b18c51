//! Feature-filter rules on a protection instance.
//!
//! The create call does not return the new rule's identifier, so the handler
//! lists the instance's rules afterwards and picks the one matching every
//! configured field.

use std::sync::Arc;

use tracing::debug;

use crate::api::{AntiddosApi, PacketFilterConfig, PacketFilterRelation};
use crate::classify::CodeClassifier;
use crate::config::ConvergeConfig;
use crate::resource::{Created, HandlerFuture, ResourceError, ResourceHandler, join_id, split_id};
use crate::throttle::ActionLimiter;

use super::call_api;

/// The rule already exists; creating it again is a no-op.
const RESOURCE_IN_USE: &str = "ResourceInUse";

/// Packet-filter rule applied to one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketFilterRule {
    /// Protection instance identifier.
    pub instance_id: String,
    /// Rule fields; `config.id` is filled in once the rule exists.
    pub config: PacketFilterConfig,
}

/// Handler for [`PacketFilterRule`].
#[derive(Clone, Debug)]
pub struct PacketFilterConfigResource<A> {
    api: A,
    config: ConvergeConfig,
    limiter: Arc<ActionLimiter>,
}

impl<A: AntiddosApi> PacketFilterConfigResource<A> {
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

    async fn list(&self, instance_id: &str) -> Result<Vec<PacketFilterRelation>, ResourceError> {
        let api = &self.api;
        let listed = call_api(
            &self.limiter,
            &self.config.read_budget(),
            &CodeClassifier::new(),
            "DescribeListPacketFilterConfig",
            &serde_json::json!({ "FilterInstanceId": instance_id }),
            move || api.describe_packet_filter_configs(instance_id),
        )
        .await?;
        Ok(listed.unwrap_or_default())
    }
}

impl<A: AntiddosApi> ResourceHandler for PacketFilterConfigResource<A> {
    const TYPE_NAME: &'static str = "antiddos_packet_filter_config";
    type Model = PacketFilterRule;

    fn create<'a>(
        &'a self,
        model: &'a PacketFilterRule,
    ) -> HandlerFuture<'a, Created<PacketFilterRule>> {
        Box::pin(async move {
            let api = &self.api;
            let instance_id = model.instance_id.as_str();
            let rule = &model.config;
            call_api(
                &self.limiter,
                &self.config.write_budget(),
                &CodeClassifier::new().accept(RESOURCE_IN_USE),
                "CreatePacketFilterConfig",
                &serde_json::json!({ "InstanceId": instance_id, "PacketFilterConfig": rule }),
                move || api.create_packet_filter_config(instance_id, rule),
            )
            .await?;

            let located = self
                .list(instance_id)
                .await?
                .into_iter()
                .map(|relation| relation.packet_filter_config)
                .find(|remote| rule.same_rule(remote));
            let Some(config_id) = located.and_then(|remote| remote.id) else {
                return Err(ResourceError::NotLocated {
                    resource: Self::TYPE_NAME,
                    instance_id: model.instance_id.clone(),
                });
            };

            Ok(Created {
                id: join_id(&[instance_id, &config_id]),
                model: PacketFilterRule {
                    instance_id: model.instance_id.clone(),
                    config: PacketFilterConfig {
                        id: Some(config_id),
                        ..model.config.clone()
                    },
                },
            })
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a str,
        _prior: Option<&'a PacketFilterRule>,
    ) -> HandlerFuture<'a, Option<PacketFilterRule>> {
        Box::pin(async move {
            let [instance_id, config_id] = split_id::<2>(Self::TYPE_NAME, id)?;
            let found = self
                .list(&instance_id)
                .await?
                .into_iter()
                .map(|relation| relation.packet_filter_config)
                .find(|remote| remote.id.as_deref() == Some(config_id.as_str()));
            Ok(found.map(|config| PacketFilterRule {
                instance_id,
                config,
            }))
        })
    }

    fn delete<'a>(&'a self, id: &'a str, model: &'a PacketFilterRule) -> HandlerFuture<'a, ()> {
        Box::pin(async move {
            let instance_id = model.instance_id.as_str();
            let listed = self
                .list(instance_id)
                .await?
                .into_iter()
                .map(|relation| relation.packet_filter_config)
                .find(|remote| remote.id.is_some() && remote.id == model.config.id);
            let Some(remote) = listed else {
                debug!(id, "packet-filter rule already gone; nothing to delete");
                return Ok(());
            };

            let api = &self.api;
            let rule = &remote;
            call_api(
                &self.limiter,
                &self.config.write_budget(),
                &CodeClassifier::new(),
                "DeletePacketFilterConfig",
                &serde_json::json!({ "InstanceId": instance_id, "PacketFilterConfig": rule }),
                move || api.delete_packet_filter_config(instance_id, rule),
            )
            .await?;
            Ok(())
        })
    }
}
