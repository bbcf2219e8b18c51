//! Request and response models for the Anti-DDoS API.
//!
//! Field names serialise in the API's PascalCase so request bodies can be
//! logged exactly as they are sent.

use serde::{Deserialize, Serialize};

/// Device bound to (or unbound from) a BGP protection instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundIpInfo {
    /// IP address of the device.
    pub ip: String,
    /// Business type of the device, for example `public`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_type: Option<String>,
    /// Cloud resource identifier owning the IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Device type, for example `cvm` or `clb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Carrier code for the IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp_code: Option<u64>,
    /// Domain bound to the device, when the device type requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Device list carried by a `CreateBoundIP` request.
///
/// The API accepts binds and unbinds through the same action; only one list
/// is populated per request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BoundIpChange {
    /// Devices to attach.
    #[serde(rename = "BoundDevList")]
    Bind(Vec<BoundIpInfo>),
    /// Devices to detach.
    #[serde(rename = "UnBoundDevList")]
    Unbind(Vec<BoundIpInfo>),
}

impl BoundIpChange {
    /// Devices affected by the change.
    #[must_use]
    pub fn devices(&self) -> &[BoundIpInfo] {
        match self {
            Self::Bind(devices) | Self::Unbind(devices) => devices,
        }
    }
}

/// Request body of `CreateBoundIP`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateBoundIpRequest {
    /// Product line, `bgp` for BGP instances.
    pub business: String,
    /// Protection instance identifier.
    pub id: String,
    /// Devices to bind or unbind.
    #[serde(flatten)]
    pub change: BoundIpChange,
    /// Instance whose policy is copied onto the bound devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_policy: Option<String>,
}

/// Identifier and protected addresses of an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceDetail {
    /// Protection instance identifier.
    pub instance_id: String,
    /// Protected addresses.
    #[serde(default)]
    pub eip_list: Vec<String>,
}

/// BGP protection instance returned by `DescribeListBGPInstances`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BgpInstance {
    /// Identifier and protected addresses.
    pub instance_detail: InstanceDetail,
    /// Lifecycle status, for example `idle` or `isolate`.
    pub status: String,
    /// Binding progress: `idle`, `binding`, or `unbinding`.
    pub bound_status: String,
}

/// Resource an EIP is attached to.
///
/// Serialises as the bare field pair each association action expects; the
/// field names tell the variants apart.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EipTarget {
    /// Cloud virtual machine.
    Cvm {
        /// CVM instance identifier.
        #[serde(rename = "CvmInstanceID")]
        instance_id: String,
        /// Region of the CVM instance.
        #[serde(rename = "CvmRegion")]
        region: String,
    },
    /// Cloud load balancer.
    LoadBalancer {
        /// Load balancer identifier.
        #[serde(rename = "LoadBalancerID")]
        load_balancer_id: String,
        /// Region of the load balancer.
        #[serde(rename = "LoadBalancerRegion")]
        region: String,
    },
}

impl EipTarget {
    /// Identifier of the attached resource.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Cvm { instance_id, .. } => instance_id,
            Self::LoadBalancer {
                load_balancer_id, ..
            } => load_balancer_id,
        }
    }

    /// Region of the attached resource.
    #[must_use]
    pub fn region(&self) -> &str {
        match self {
            Self::Cvm { region, .. } | Self::LoadBalancer { region, .. } => region,
        }
    }
}

/// Request body of `AssociateDDoSEipAddress` / `AssociateDDoSEipLoadBalancer`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssociateEipRequest {
    /// BGP-IP instance identifier.
    pub instance_id: String,
    /// Elastic IP to associate.
    pub eip: String,
    /// Resource receiving the EIP.
    #[serde(flatten)]
    pub target: EipTarget,
}

/// Where an EIP is currently bound.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EipAddressRelation {
    /// Region of the bound resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip_address_region: Option<String>,
    /// Identifier of the bound resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip_bound_rsc_ins: Option<String>,
}

/// BGP-IP instance returned by `DescribeListBGPIPInstances`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BgpIpInstance {
    /// Identifier and protected addresses.
    pub instance_detail: InstanceDetail,
    /// EIP binding progress: `BINDING`, `BIND`, `UNBINDING`, or `UNBIND`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip_address_status: Option<String>,
    /// Current EIP binding, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip_address_info: Option<EipAddressRelation>,
}

/// Feature-filter rule applied to an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketFilterConfig {
    /// Server-assigned rule identifier; absent on create requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `tcp`, `udp`, `icmp`, or `all`.
    pub protocol: String,
    /// Starting source port.
    pub sport_start: u64,
    /// End source port.
    pub sport_end: u64,
    /// Starting destination port.
    pub dport_start: u64,
    /// End destination port.
    pub dport_end: u64,
    /// Minimum packet length.
    pub pktlen_min: u64,
    /// Maximum packet length.
    pub pktlen_max: u64,
    /// Action applied to matching packets, for example `drop`.
    pub action: String,
    /// Detection position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_begin: Option<String>,
    /// Detection type: `sunday` (keyword) or `pcre` (regular expression).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    /// Keyword or expression to detect.
    #[serde(default, rename = "Str", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Detection depth from the detection position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
    /// Offset from the detection position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// `0` to match packets containing the value, `1` to match the rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_not: Option<u64>,
    /// Relation with the second condition: `and` or `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_logic: Option<String>,
    /// Second detection position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_begin2: Option<String>,
    /// Second detection type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type2: Option<String>,
    /// Second keyword or expression.
    #[serde(default, rename = "Str2", skip_serializing_if = "Option::is_none")]
    pub pattern2: Option<String>,
    /// Second detection depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth2: Option<u64>,
    /// Second detection offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset2: Option<u64>,
    /// Inclusion flag of the second condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_not2: Option<u64>,
    /// Matches packets longer than this length.
    #[serde(default, rename = "PktLenGT", skip_serializing_if = "Option::is_none")]
    pub pkt_len_gt: Option<u64>,
}

impl PacketFilterConfig {
    /// Returns true when `remote` carries the same rule as `self`.
    ///
    /// The identifier is ignored. `match_logic` and `match_begin2` are
    /// server-defaulted, so they only take part when set locally.
    #[must_use]
    pub fn same_rule(&self, remote: &Self) -> bool {
        let server_defaulted = |local: &Option<String>, other: &Option<String>| {
            local.as_deref().is_none_or(str::is_empty) || local == other
        };

        self.protocol == remote.protocol
            && self.sport_start == remote.sport_start
            && self.sport_end == remote.sport_end
            && self.dport_start == remote.dport_start
            && self.dport_end == remote.dport_end
            && self.pktlen_min == remote.pktlen_min
            && self.pktlen_max == remote.pktlen_max
            && self.action == remote.action
            && self.match_begin == remote.match_begin
            && self.match_type == remote.match_type
            && self.pattern == remote.pattern
            && self.depth == remote.depth
            && self.offset == remote.offset
            && self.is_not == remote.is_not
            && server_defaulted(&self.match_logic, &remote.match_logic)
            && server_defaulted(&self.match_begin2, &remote.match_begin2)
            && self.match_type2 == remote.match_type2
            && self.pattern2 == remote.pattern2
            && self.depth2 == remote.depth2
            && self.offset2 == remote.offset2
            && self.is_not2 == remote.is_not2
            && self.pkt_len_gt == remote.pkt_len_gt
    }
}

/// Packet-filter rule together with the instances it applies to.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketFilterRelation {
    /// The rule itself.
    pub packet_filter_config: PacketFilterConfig,
    /// Instances the rule applies to.
    #[serde(default)]
    pub instance_detail_list: Vec<InstanceDetail>,
    /// Last modification time reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_time: Option<String>,
}

impl PacketFilterRelation {
    /// Returns true when the rule applies to `instance_id`.
    #[must_use]
    pub fn applies_to(&self, instance_id: &str) -> bool {
        self.instance_detail_list
            .iter()
            .any(|detail| detail.instance_id == instance_id)
    }
}

/// Request body of `ModifyDDoSThreshold`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyThresholdRequest {
    /// Product line, for example `bgp-multip`.
    pub business: String,
    /// Protection instance identifier.
    pub id: String,
    /// Cleaning threshold in Mbps; `0` restores the default.
    pub threshold: u64,
}

/// Request body of `ModifyDDoSLevel`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyLevelRequest {
    /// Product line.
    pub business: String,
    /// Protection instance identifier.
    pub id: String,
    /// `get` or `set`.
    pub method: String,
    /// Protection level: `low`, `middle`, or `high`.
    #[serde(rename = "DDoSLevel")]
    pub ddos_level: String,
}

/// Threshold and level currently applied to an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProtectThresholdRelation {
    /// Protection level.
    #[serde(rename = "DDoSLevel")]
    pub ddos_level: String,
    /// Cleaning threshold in Mbps.
    #[serde(rename = "DDoSThreshold")]
    pub ddos_threshold: u64,
    /// Instances the configuration applies to.
    #[serde(default)]
    pub instance_detail_list: Vec<InstanceDetail>,
}
