//! Provider glue for Tencent Cloud Anti-DDoS resources.
//!
//! Remote calls go through [`retry::retry_until_success`], which repeats
//! transient failures within a time budget, and mutations are followed by
//! [`poll::wait_for_state`], which waits for the entity's reported status to
//! settle. Every call first takes a slot from the per-action
//! [`throttle::ActionLimiter`]. [`classify`] decides which cloud error codes
//! are retried, accepted as no-ops, or surfaced. The [`resources`] module
//! builds the bound-IP, EIP attachment, packet-filter, and
//! protection-threshold resources on top of the CRUD framework in
//! [`resource`].

pub mod api;
pub mod classify;
pub mod config;
pub mod poll;
pub mod resource;
pub mod resources;
pub mod retry;
pub mod test_support;
pub mod throttle;

pub use api::{AntiddosApi, ApiError, ApiFuture};
pub use classify::{Classify, CodeClassifier, ErrorClass, ErrorCode};
pub use config::{ConfigError, ConvergeConfig};
pub use poll::{PollState, PollTarget, WaitError, wait_for_state};
pub use resource::{Created, ResourceError, ResourceHandler, ResourceState};
pub use resources::{
    BoundIp, BoundIpResource, EipAttachment, EipAttachmentResource, PacketFilterConfigResource,
    PacketFilterRule, ProtectThreshold, ProtectThresholdResource,
};
pub use retry::{RetryBudget, RetryError, retry_until_success};
pub use throttle::ActionLimiter;
