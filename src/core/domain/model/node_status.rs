//! Domain model for node status from the `nodeStatus.getLatest` method.
//!
//! This module defines both the wire sample and the live status group
//! that is merged into a node entity.

use crate::core::domain::value_object::serde_helpers::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest status samples keyed by node UUID.
pub type NodeStatuses = BTreeMap<String, NodeStatus>;

/// Latest status sample of a node as reported by the backend.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeStatus {
    /// UUID of the node the sample belongs to.
    #[serde(deserialize_with = "null_as_default")]
    pub client: String,
    /// Sample timestamp (RFC 3339).
    #[serde(deserialize_with = "null_as_default")]
    pub time: String,
    /// CPU usage percentage (0 to 100).
    pub cpu: f64,
    pub gpu: f64,
    /// Used memory in bytes.
    pub ram: u64,
    pub ram_total: u64,
    pub swap: u64,
    pub swap_total: u64,
    /// Load average over 1, 5 and 15 minutes.
    pub load: f64,
    pub load5: f64,
    pub load15: f64,
    /// Temperature in degrees Celsius.
    pub temp: f64,
    /// Used disk in bytes.
    pub disk: u64,
    pub disk_total: u64,
    /// Inbound throughput in bytes per second.
    pub net_in: u64,
    /// Outbound throughput in bytes per second.
    pub net_out: u64,
    pub net_total_up: u64,
    pub net_total_down: u64,
    pub process: u64,
    pub connections: u64,
    pub connections_udp: u64,
    pub online: bool,
    /// Uptime in seconds.
    pub uptime: u64,
}

/// The live status group of a node entity.
///
/// `Default` is the "unknown" state: offline with every metric at zero.
/// Capacity totals are not part of this group; they come from the descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodeLiveStatus {
    pub online: bool,
    pub time: String,
    pub cpu: f64,
    pub gpu: f64,
    pub ram: u64,
    pub swap: u64,
    pub load: f64,
    pub load5: f64,
    pub load15: f64,
    pub temp: f64,
    pub disk: u64,
    pub net_in: u64,
    pub net_out: u64,
    pub net_total_up: u64,
    pub net_total_down: u64,
    pub process: u64,
    pub connections: u64,
    pub connections_udp: u64,
    pub uptime: u64,
}

impl From<&NodeStatus> for NodeLiveStatus {
    fn from(status: &NodeStatus) -> Self {
        Self {
            online: status.online,
            time: status.time.clone(),
            cpu: status.cpu,
            gpu: status.gpu,
            ram: status.ram,
            swap: status.swap,
            load: status.load,
            load5: status.load5,
            load15: status.load15,
            temp: status.temp,
            disk: status.disk,
            net_in: status.net_in,
            net_out: status.net_out,
            net_total_up: status.net_total_up,
            net_total_down: status.net_total_down,
            process: status.process,
            connections: status.connections,
            connections_udp: status.connections_udp,
            uptime: status.uptime,
        }
    }
}
