//! Domain model for node descriptors returned by `client.getNodes`.
//!
//! A descriptor is the static half of a node: hardware, OS, addresses,
//! billing metadata and grouping. It changes rarely and arrives on its own
//! call, independently of the live status samples.

use crate::core::domain::value_object::serde_helpers::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptors keyed by node UUID, as one complete snapshot.
pub type NodeDescriptors = BTreeMap<String, NodeDescriptor>;

/// Descriptive attributes of a monitored node.
///
/// Missing or `null` fields decode to their defaults so that older backends
/// which omit billing or traffic fields still produce a usable descriptor.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeDescriptor {
    /// Stable node identifier.
    pub uuid: String,
    /// Display name.
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub virtualization: String,
    #[serde(deserialize_with = "null_as_default")]
    pub arch: String,
    pub cpu_cores: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub os: String,
    #[serde(deserialize_with = "null_as_default")]
    pub kernel_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    /// Region, usually a flag emoji or country code.
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    /// Private remark, only visible to logged-in users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub public_remark: String,
    /// Total memory in bytes.
    pub mem_total: u64,
    /// Total swap in bytes.
    pub swap_total: u64,
    /// Total disk in bytes.
    pub disk_total: u64,
    /// Agent version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Ordering key; lower weights are listed first.
    pub weight: i64,
    pub price: f64,
    /// Billing cycle in days.
    pub billing_cycle: i64,
    pub auto_renewal: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub expired_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub group: String,
    /// Semicolon separated tag list.
    #[serde(deserialize_with = "null_as_default")]
    pub tags: String,
    pub hidden: bool,
    /// Traffic allowance in bytes, 0 when unlimited.
    pub traffic_limit: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub traffic_limit_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

impl NodeDescriptor {
    /// Splits the `tags` field into trimmed, non-empty tags.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}
