//! Concrete Anti-DDoS resources built on [`crate::resource`].

pub mod boundip;
pub mod eip_attachment;
pub mod packet_filter_config;
pub mod protect_threshold;

use std::future::Future;

use serde::Serialize;
use tracing::{debug, error};

use crate::api::ApiError;
use crate::classify::CodeClassifier;
use crate::resource::ResourceError;
use crate::retry::{RetryBudget, retry_until_success};
use crate::throttle::ActionLimiter;

pub use boundip::{BoundIp, BoundIpResource};
pub use eip_attachment::{EipAttachment, EipAttachmentResource};
pub use packet_filter_config::{PacketFilterConfigResource, PacketFilterRule};
pub use protect_threshold::{ProtectThreshold, ProtectThresholdResource};

/// Sends one API action through the retry wrapper, logging the request body
/// before the first attempt and again when the call finally fails. Every
/// attempt first takes a slot from the action's bucket in `limiter`.
///
/// Returns `Ok(None)` when the call ended with an acceptable error.
async fn call_api<T, R, F, Fut>(
    limiter: &ActionLimiter,
    budget: &RetryBudget,
    classifier: &CodeClassifier,
    action: &'static str,
    request: &R,
    operation: F,
) -> Result<Option<T>, ResourceError>
where
    R: Serialize + ?Sized,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let body = serde_json::to_string(request)
        .unwrap_or_else(|err| format!("<unserialisable request: {err}>"));
    debug!(action, request = %body, "calling api");
    let send = &operation;
    retry_until_success(budget, classifier, move || async move {
        limiter.acquire(action).await;
        send().await
    })
    .await
    .map_err(|err| {
        error!(action, request = %body, reason = %err, "api call failed");
        ResourceError::call(action, err)
    })
}
