//! Seam between the resource handlers and the Anti-DDoS cloud API.
//!
//! Handlers only talk to [`AntiddosApi`]; a production client wraps the
//! vendor SDK while tests plug in the scripted double from
//! [`crate::test_support`].

mod error;
mod models;

use std::future::Future;
use std::pin::Pin;

pub use error::ApiError;
pub use models::{
    AssociateEipRequest, BgpInstance, BgpIpInstance, BoundIpChange, BoundIpInfo,
    CreateBoundIpRequest, EipAddressRelation, EipTarget, InstanceDetail, ModifyLevelRequest,
    ModifyThresholdRequest, PacketFilterConfig, PacketFilterRelation, ProtectThresholdRelation,
};

/// Future returned by API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Remote operations used by the Anti-DDoS resources.
///
/// Each method maps onto one cloud API action. Describe methods return
/// `Ok(None)` (or an empty list) when the provider reports no match.
pub trait AntiddosApi: Send + Sync {
    /// `CreateBoundIP`: binds or unbinds devices on a BGP instance.
    fn create_bound_ip<'a>(&'a self, request: &'a CreateBoundIpRequest) -> ApiFuture<'a, ()>;

    /// `DescribeListBGPInstances` filtered to a single instance.
    fn describe_bgp_instance<'a>(
        &'a self,
        business: &'a str,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Option<BgpInstance>>;

    /// `AssociateDDoSEipAddress` or `AssociateDDoSEipLoadBalancer`, chosen by
    /// the request target.
    fn associate_eip_address<'a>(&'a self, request: &'a AssociateEipRequest) -> ApiFuture<'a, ()>;

    /// `DisassociateDDoSEipAddress`.
    fn disassociate_eip_address<'a>(
        &'a self,
        instance_id: &'a str,
        eip: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// `DescribeListBGPIPInstances` filtered to a single instance.
    fn describe_bgpip_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Option<BgpIpInstance>>;

    /// `CreatePacketFilterConfig`.
    fn create_packet_filter_config<'a>(
        &'a self,
        instance_id: &'a str,
        config: &'a PacketFilterConfig,
    ) -> ApiFuture<'a, ()>;

    /// `DescribeListPacketFilterConfig` filtered to one instance.
    fn describe_packet_filter_configs<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Vec<PacketFilterRelation>>;

    /// `DeletePacketFilterConfig`.
    fn delete_packet_filter_config<'a>(
        &'a self,
        instance_id: &'a str,
        config: &'a PacketFilterConfig,
    ) -> ApiFuture<'a, ()>;

    /// `ModifyDDoSThreshold`.
    fn modify_ddos_threshold<'a>(&'a self, request: &'a ModifyThresholdRequest)
    -> ApiFuture<'a, ()>;

    /// `ModifyDDoSLevel`.
    fn modify_ddos_level<'a>(&'a self, request: &'a ModifyLevelRequest) -> ApiFuture<'a, ()>;

    /// `DescribeListProtectThresholdConfig` filtered to one instance.
    fn describe_protect_threshold<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ApiFuture<'a, Option<ProtectThresholdRelation>>;
}
