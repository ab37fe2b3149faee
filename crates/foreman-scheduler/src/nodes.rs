//! Registry of the nodes a scheduler can place work on.

use foreman_core::{Computer, NodeDirectory, NodeId};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Nodes in discovery order.
///
/// Placement walks nodes in this order, so an unchanged registry yields the
/// same placements pass after pass.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<Vec<Arc<dyn Computer>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, or replaces the node of the same name in place.
    pub fn register(&self, computer: Arc<dyn Computer>) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        match nodes.iter().position(|n| n.id() == computer.id()) {
            Some(i) => nodes[i] = computer,
            None => {
                info!(node = %computer.id(), executors = computer.count_executors(), "Registered node");
                nodes.push(computer);
            }
        }
    }

    pub fn remove(&self, id: &NodeId) -> Option<Arc<dyn Computer>> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let i = nodes.iter().position(|n| n.id() == id)?;
        info!(node = %id, "Removed node");
        Some(nodes.remove(i))
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<dyn Computer>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }

    /// Snapshot of all nodes in discovery order.
    pub fn all(&self) -> Vec<Arc<dyn Computer>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeDirectory for NodeRegistry {
    fn resolve(&self, id: &NodeId) -> Option<Arc<dyn Computer>> {
        self.get(id)
    }
}
