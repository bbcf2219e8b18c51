//! DDoS cleaning threshold and protection level of an instance.

use std::sync::Arc;

use crate::api::{AntiddosApi, ModifyLevelRequest, ModifyThresholdRequest};
use crate::classify::CodeClassifier;
use crate::config::ConvergeConfig;
use crate::resource::{Created, HandlerFuture, ResourceError, ResourceHandler, join_id, split_id};
use crate::throttle::ActionLimiter;

use super::call_api;

/// Returned while the instance cannot take a threshold change; the change is
/// dropped rather than retried.
const RESOURCE_UNAVAILABLE: &str = "ResourceUnavailable";

/// Level restored on delete.
pub const DEFAULT_LEVEL: &str = "middle";

/// Threshold restored on delete; zero selects the service default.
pub const DEFAULT_THRESHOLD: u64 = 0;

const LEVEL_METHOD_SET: &str = "set";

/// Protection settings for one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtectThreshold {
    /// Product line, for example `bgpip` or `bgp-multip`.
    pub business: String,
    /// Protection instance identifier.
    pub instance_id: String,
    /// Cleaning threshold in Mbps.
    pub threshold: u64,
    /// Protection level: `low`, `middle`, or `high`.
    pub ddos_level: String,
}

/// Handler for [`ProtectThreshold`].
#[derive(Clone, Debug)]
pub struct ProtectThresholdResource<A> {
    api: A,
    config: ConvergeConfig,
    limiter: Arc<ActionLimiter>,
}

impl<A: AntiddosApi> ProtectThresholdResource<A> {
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

    async fn apply(
        &self,
        business: &str,
        instance_id: &str,
        threshold: u64,
        ddos_level: &str,
    ) -> Result<(), ResourceError> {
        let api = &self.api;
        let level = ModifyLevelRequest {
            business: business.to_owned(),
            id: instance_id.to_owned(),
            method: LEVEL_METHOD_SET.to_owned(),
            ddos_level: ddos_level.to_owned(),
        };
        let level_body = &level;
        call_api(
            &self.limiter,
            &self.config.write_budget(),
            &CodeClassifier::new(),
            "ModifyDDoSLevel",
            level_body,
            move || api.modify_ddos_level(level_body),
        )
        .await?;

        let threshold_request = ModifyThresholdRequest {
            business: business.to_owned(),
            id: instance_id.to_owned(),
            threshold,
        };
        let threshold_body = &threshold_request;
        call_api(
            &self.limiter,
            &self.config.write_budget(),
            &CodeClassifier::new().accept(RESOURCE_UNAVAILABLE),
            "ModifyDDoSThreshold",
            threshold_body,
            move || api.modify_ddos_threshold(threshold_body),
        )
        .await?;
        Ok(())
    }
}

impl<A: AntiddosApi> ResourceHandler for ProtectThresholdResource<A> {
    const TYPE_NAME: &'static str = "antiddos_protect_threshold";
    type Model = ProtectThreshold;

    fn create<'a>(
        &'a self,
        model: &'a ProtectThreshold,
    ) -> HandlerFuture<'a, Created<ProtectThreshold>> {
        Box::pin(async move {
            self.apply(
                &model.business,
                &model.instance_id,
                model.threshold,
                &model.ddos_level,
            )
            .await?;
            Ok(Created {
                id: join_id(&[&model.instance_id, &model.business]),
                model: model.clone(),
            })
        })
    }

    fn read<'a>(
        &'a self,
        id: &'a str,
        _prior: Option<&'a ProtectThreshold>,
    ) -> HandlerFuture<'a, Option<ProtectThreshold>> {
        Box::pin(async move {
            let [instance_id, business] = split_id::<2>(Self::TYPE_NAME, id)?;
            let api = &self.api;
            let lookup = instance_id.as_str();
            let found = call_api(
                &self.limiter,
                &self.config.read_budget(),
                &CodeClassifier::new(),
                "DescribeListProtectThresholdConfig",
                &serde_json::json!({ "FilterInstanceId": lookup, "Limit": 1 }),
                move || api.describe_protect_threshold(lookup),
            )
            .await?
            .flatten();
            Ok(found.map(|relation| ProtectThreshold {
                business,
                instance_id,
                threshold: relation.ddos_threshold,
                ddos_level: relation.ddos_level,
            }))
        })
    }

    fn update<'a>(
        &'a self,
        _id: &'a str,
        model: &'a ProtectThreshold,
    ) -> HandlerFuture<'a, ProtectThreshold> {
        Box::pin(async move {
            self.apply(
                &model.business,
                &model.instance_id,
                model.threshold,
                &model.ddos_level,
            )
            .await?;
            Ok(model.clone())
        })
    }

    fn delete<'a>(&'a self, _id: &'a str, model: &'a ProtectThreshold) -> HandlerFuture<'a, ()> {
        Box::pin(async move {
            self.apply(
                &model.business,
                &model.instance_id,
                DEFAULT_THRESHOLD,
                DEFAULT_LEVEL,
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::api::ApiError;
    use crate::resource::{self, ResourceState};
    use crate::test_support::{ApiAction, ScriptedAntiddos};

    #[fixture]
    fn config() -> ConvergeConfig {
        ConvergeConfig {
            read_timeout_secs: 10,
            write_timeout_secs: 10,
            retry_interval_ms: 1000,
            poll_interval_ms: 1000,
            rate_limit_per_sec: 20,
        }
    }

    #[fixture]
    fn settings() -> ProtectThreshold {
        ProtectThreshold {
            business: String::from("bgpip"),
            instance_id: String::from("bgpip-00000001"),
            threshold: 100,
            ddos_level: String::from("high"),
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn create_sets_level_and_threshold(config: ConvergeConfig, settings: ProtectThreshold) {
        let api = ScriptedAntiddos::new();
        let handler = ProtectThresholdResource::new(api.clone(), config);
        let mut state = ResourceState::empty();

        resource::create(&handler, &settings, &mut state)
            .await
            .unwrap_or_else(|err| panic!("create failed: {err}"));
        resource::refresh(&handler, &mut state)
            .await
            .unwrap_or_else(|err| panic!("refresh failed: {err}"));

        assert_eq!(state.id(), Some("bgpip-00000001#bgpip"));
        assert_eq!(state.model(), Some(&settings));
        let levels = api.level_requests();
        assert_eq!(levels.len(), 1);
        assert!(levels.iter().all(|request| request.method == "set"));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn unavailable_threshold_is_accepted(config: ConvergeConfig, settings: ProtectThreshold) {
        let api = ScriptedAntiddos::new();
        api.push_failure(
            ApiAction::ModifyThreshold,
            ApiError::service(RESOURCE_UNAVAILABLE, "instance busy"),
        );
        let handler = ProtectThresholdResource::new(api.clone(), config);
        let mut state = ResourceState::empty();

        resource::create(&handler, &settings, &mut state)
            .await
            .unwrap_or_else(|err| panic!("create failed: {err}"));

        assert_eq!(api.calls(ApiAction::ModifyThreshold), 1);
        assert!(state.is_tracked());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn update_applies_new_values(config: ConvergeConfig, settings: ProtectThreshold) {
        let api = ScriptedAntiddos::new();
        let handler = ProtectThresholdResource::new(api.clone(), config);
        let mut state = ResourceState::tracking("bgpip-00000001#bgpip", settings.clone());
        let changed = ProtectThreshold {
            threshold: 200,
            ..settings
        };

        resource::update(&handler, &changed, &mut state)
            .await
            .unwrap_or_else(|err| panic!("update failed: {err}"));

        assert_eq!(state.model().map(|model| model.threshold), Some(200));
        let thresholds = api.threshold_requests();
        assert_eq!(thresholds.last().map(|request| request.threshold), Some(200));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn delete_restores_defaults(config: ConvergeConfig, settings: ProtectThreshold) {
        let api = ScriptedAntiddos::new();
        let handler = ProtectThresholdResource::new(api.clone(), config);
        let mut state = ResourceState::tracking("bgpip-00000001#bgpip", settings);

        resource::destroy(&handler, &mut state)
            .await
            .unwrap_or_else(|err| panic!("destroy failed: {err}"));

        assert!(!state.is_tracked());
        let thresholds = api.threshold_requests();
        assert_eq!(thresholds.last().map(|request| request.threshold), Some(DEFAULT_THRESHOLD));
        let levels = api.level_requests();
        assert_eq!(
            levels.last().map(|request| request.ddos_level.as_str()),
            Some(DEFAULT_LEVEL)
        );
    }
}
