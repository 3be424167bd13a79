//! In-memory fleet state: the canonical set of node entities plus the
//! connection state recorded by the orchestrator.

use crate::core::domain::model::{
    connection_state::ConnectionState,
    node_descriptor::NodeDescriptors,
    node_entity::NodeEntity,
    node_status::NodeStatuses,
};
use std::collections::HashSet;
use tracing::debug;

/// Canonical set of node entities, kept sorted by weight.
///
/// - Exactly one entity per UUID.
/// - Membership always equals the id set of the latest
///   [`initialize`](Self::initialize) or
///   [`update_descriptors`](Self::update_descriptors) call.
/// - Entities are ordered by ascending weight; equal weights keep their
///   previous relative order and new entities are placed after existing ones.
#[derive(Debug, Clone, Default)]
pub struct FleetStore {
    nodes: Vec<NodeEntity>,
    connection_state: ConnectionState,
    reconnect_attempts: u32,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full reconciliation from a descriptor snapshot and an optional status
    /// snapshot.
    ///
    /// Entities listed in `descriptors` are rebuilt from it, taking their
    /// status from `statuses` or falling back to the unknown state. Entities
    /// missing from `descriptors` are removed.
    pub fn initialize(&mut self, descriptors: &NodeDescriptors, statuses: Option<&NodeStatuses>) {
        self.reconcile(descriptors, |entity| {
            let status = statuses.and_then(|statuses| statuses.get(entity.uuid()));
            match status {
                Some(status) => entity.apply_status(status),
                None => entity.reset_status(),
            }
        });
        debug!(total = self.nodes.len(), "Fleet initialized");
    }

    /// Incremental descriptor update.
    ///
    /// Existing entities keep their status, new entities start unknown and
    /// entities missing from `descriptors` are removed.
    pub fn update_descriptors(&mut self, descriptors: &NodeDescriptors) {
        self.reconcile(descriptors, |_| {});
    }

    /// Incremental status update. Ids without a matching entity are ignored.
    pub fn update_statuses(&mut self, statuses: &NodeStatuses) {
        for entity in &mut self.nodes {
            if let Some(status) = statuses.get(entity.uuid()) {
                entity.apply_status(status);
            }
        }
        self.sort_by_weight();
    }

    fn reconcile(
        &mut self,
        descriptors: &NodeDescriptors,
        mut on_kept: impl FnMut(&mut NodeEntity),
    ) {
        let before = self.nodes.len();
        self.nodes.retain(|entity| descriptors.contains_key(entity.uuid()));
        let removed = before - self.nodes.len();

        let known: HashSet<String> = self
            .nodes
            .iter()
            .map(|entity| entity.uuid().to_string())
            .collect();

        for entity in &mut self.nodes {
            if let Some(descriptor) = descriptors.get(entity.uuid()) {
                entity.set_descriptor(descriptor.clone());
            }
            on_kept(entity);
        }

        let mut added = 0;
        for (uuid, descriptor) in descriptors {
            if known.contains(uuid) {
                continue;
            }
            let mut entity = NodeEntity::new(uuid.clone(), descriptor.clone());
            on_kept(&mut entity);
            self.nodes.push(entity);
            added += 1;
        }

        if added > 0 || removed > 0 {
            debug!(added, removed, total = self.nodes.len(), "Fleet membership changed");
        }
        self.sort_by_weight();
    }

    fn sort_by_weight(&mut self) {
        // `sort_by_key` is stable.
        self.nodes.sort_by_key(NodeEntity::weight);
    }

    /// Removes every entity and resets the connection state.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connection_state = ConnectionState::Disconnected;
        self.reconnect_attempts = 0;
    }

    /// Entities in display order.
    pub fn nodes(&self) -> &[NodeEntity] {
        &self.nodes
    }

    pub fn get(&self, uuid: &str) -> Option<&NodeEntity> {
        self.nodes.iter().find(|entity| entity.uuid() == uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.get(uuid).is_some()
    }

    pub fn online_count(&self) -> usize {
        self.nodes.iter().filter(|entity| entity.is_online()).count()
    }

    pub fn total_count(&self) -> usize {
        self.nodes.len()
    }

    /// Distinct non-empty group names in display order.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .map(NodeEntity::group)
            .filter(|group| !group.is_empty() && seen.insert(*group))
            .collect()
    }

    /// Records the connection state; `attempts` is left untouched when `None`.
    pub fn update_connection_state(&mut self, state: ConnectionState, attempts: Option<u32>) {
        self.connection_state = state;
        if let Some(attempts) = attempts {
            self.reconnect_attempts = attempts;
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }
}
