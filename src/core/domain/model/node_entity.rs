use crate::core::domain::model::{
    node_descriptor::NodeDescriptor,
    node_status::{NodeLiveStatus, NodeStatus},
};
use serde::Serialize;

/// A monitored node: its descriptor merged with its latest live status.
///
/// The UUID is fixed at construction. The two attribute groups are only ever
/// replaced independently, so a descriptor refresh keeps the last known
/// status and a status sample never touches the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEntity {
    uuid: String,
    descriptor: NodeDescriptor,
    status: NodeLiveStatus,
}

impl NodeEntity {
    /// Creates an entity with unknown status.
    pub(crate) fn new(uuid: String, descriptor: NodeDescriptor) -> Self {
        Self {
            uuid,
            descriptor,
            status: NodeLiveStatus::default(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> &NodeLiveStatus {
        &self.status
    }

    pub fn weight(&self) -> i64 {
        self.descriptor.weight
    }

    pub fn is_online(&self) -> bool {
        self.status.online
    }

    pub fn group(&self) -> &str {
        &self.descriptor.group
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: NodeDescriptor) {
        self.descriptor = descriptor;
    }

    pub(crate) fn apply_status(&mut self, status: &NodeStatus) {
        self.status = NodeLiveStatus::from(status);
    }

    pub(crate) fn reset_status(&mut self) {
        self.status = NodeLiveStatus::default();
    }
}
