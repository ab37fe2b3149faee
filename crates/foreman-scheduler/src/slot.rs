//! Executor slots.
//!
//! Every executor of every node is one slot in a [`SlotArena`]. Placement
//! structures refer to slots by [`SlotId`]; the only mutable state is the
//! claimed flag, flipped with a compare-and-set so that two scheduling passes
//! can never bind the same executor.

use derive_more::Display;
use foreman_core::{Computer, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::{SchedulerError, SchedulerResult};

/// Index of a slot within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("slot#{_0}")]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One executor of a node.
#[derive(Debug)]
pub struct ExecutorSlot {
    id: SlotId,
    node: NodeId,
    number: usize,
    claimed: AtomicBool,
}

impl ExecutorSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Executor number within its node, starting at 0.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Is this executor among those `node` currently has?
    pub fn is_active_on(&self, node: &dyn Computer) -> bool {
        node.id() == &self.node && self.number < node.count_executors()
    }

    pub fn is_available(&self) -> bool {
        !self.claimed.load(Ordering::Acquire)
    }

    /// Binds the slot if it is still free. Exactly one concurrent caller wins.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Frees the slot. Returns whether it had been claimed.
    pub fn release(&self) -> bool {
        self.claimed.swap(false, Ordering::AcqRel)
    }
}

/// All executor slots known to a scheduler.
///
/// Slots are only ever appended, so a [`SlotId`] stays valid for the life of
/// the arena. A slot whose number is at or above its node's current executor
/// count is dormant and must not be offered.
#[derive(Debug, Default)]
pub struct SlotArena {
    slots: RwLock<Vec<Arc<ExecutorSlot>>>,
}

impl SlotArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// One slot per executor of each node, in node order.
    pub fn for_nodes(nodes: &[Arc<dyn Computer>]) -> Self {
        let arena = Self::new();
        arena.sync(nodes);
        arena
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<ExecutorSlot>>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_node(&self, node: &NodeId, executors: usize) -> Vec<SlotId> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let first = slots.iter().filter(|s| &s.node == node).count();
        (first..first + executors)
            .map(|number| {
                let id = SlotId(slots.len());
                slots.push(Arc::new(ExecutorSlot {
                    id,
                    node: node.clone(),
                    number,
                    claimed: AtomicBool::new(false),
                }));
                id
            })
            .collect()
    }

    /// Adds the slots that `nodes` have beyond those already in the arena.
    ///
    /// Returns the new slots.
    pub fn sync(&self, nodes: &[Arc<dyn Computer>]) -> Vec<SlotId> {
        let mut added = Vec::new();
        for node in nodes {
            let known = self.read().iter().filter(|s| s.node() == node.id()).count();
            let missing = node.count_executors().saturating_sub(known);
            if missing > 0 {
                debug!(node = %node.id(), known, missing, "Adding executor slots");
                added.extend(self.add_node(node.id(), missing));
            }
        }
        added
    }

    pub fn get(&self, id: SlotId) -> Option<Arc<ExecutorSlot>> {
        self.read().get(id.0).cloned()
    }

    pub fn slot(&self, id: SlotId) -> SchedulerResult<Arc<ExecutorSlot>> {
        self.get(id).ok_or(SchedulerError::UnknownSlot(id.0))
    }

    /// Unclaimed slots in arena order.
    pub fn idle_slots(&self) -> Vec<SlotId> {
        self.read()
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.id)
            .collect()
    }

    /// Snapshot of every slot in arena order.
    pub fn slots(&self) -> Vec<Arc<ExecutorSlot>> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeComputer;
    use std::thread;

    #[test]
    fn test_add_node_numbers_executors() {
        let arena = SlotArena::new();
        let a = arena.add_node(&NodeId::new("a"), 2);
        let b = arena.add_node(&NodeId::new("b"), 1);

        assert_eq!(arena.len(), 3);
        assert_eq!(a.len(), 2);
        assert_eq!(arena.get(a[1]).unwrap().number(), 1);
        assert_eq!(arena.get(b[0]).unwrap().node(), &NodeId::new("b"));
        assert!(matches!(
            arena.slot(SlotId(7)),
            Err(SchedulerError::UnknownSlot(7))
        ));
    }

    #[test]
    fn test_claim_is_exclusive() {
        let arena = SlotArena::new();
        let ids = arena.add_node(&NodeId::new("a"), 1);
        let slot = arena.get(ids[0]).unwrap();

        assert!(slot.try_claim());
        assert!(!slot.try_claim());
        assert!(arena.idle_slots().is_empty());
        assert!(slot.release());
        assert!(!slot.release());
        assert_eq!(arena.idle_slots(), ids);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let arena = SlotArena::new();
        let ids = arena.add_node(&NodeId::new("a"), 1);
        let arena = Arc::new(arena);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arena = arena.clone();
                let id = ids[0];
                thread::spawn(move || arena.get(id).unwrap().try_claim())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_sync_adds_only_missing_slots() {
        let arena = SlotArena::new();
        let a = FakeComputer::new("a", 2);
        let nodes: Vec<Arc<dyn Computer>> = vec![a.clone()];
        assert_eq!(arena.sync(&nodes).len(), 2);
        assert!(arena.sync(&nodes).is_empty());

        let grown: Vec<Arc<dyn Computer>> =
            vec![FakeComputer::new("a", 3), FakeComputer::new("b", 1)];
        let added = arena.sync(&grown);
        assert_eq!(added.len(), 2);
        assert_eq!(arena.get(added[0]).unwrap().number(), 2);
        assert_eq!(arena.get(added[1]).unwrap().node(), &NodeId::new("b"));

        // the third executor of "a" is dormant once the node shrinks back
        let third = arena.get(added[0]).unwrap();
        assert!(third.is_active_on(&*grown[0]));
        assert!(!third.is_active_on(&*a));
        assert!(!third.is_active_on(&*grown[1]));
    }
}
