//! Work waiting for nodes.
//!
//! Demand retention launches a node once work it could run has waited long
//! enough. A [`DemandSource`] answers how long that has been.

use chrono::{DateTime, Utc};
use foreman_core::{Computer, ResourceId, Task};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub trait DemandSource: Send + Sync {
    /// When the longest-waiting work that `node` could run became runnable.
    fn waiting_since(&self, node: &dyn Computer) -> Option<DateTime<Utc>>;
}

/// A source that never reports demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDemand;

impl DemandSource for NoDemand {
    fn waiting_since(&self, _node: &dyn Computer) -> Option<DateTime<Utc>> {
        None
    }
}

struct Waiting {
    task: Arc<Task>,
    since: DateTime<Utc>,
}

/// Tasks that could not be placed yet, with the time each started waiting.
///
/// A task is demand for a node when its main sub-task may run there.
#[derive(Default)]
pub struct WaitingQueue {
    items: RwLock<Vec<Waiting>>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `task` as waiting since `since`. A task already waiting keeps
    /// its original time.
    pub fn enqueue(&self, task: Arc<Task>, since: DateTime<Utc>) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.iter().any(|w| w.task.id == task.id) {
            return;
        }
        debug!(task = %task.name, %since, "Task is waiting for an executor");
        items.push(Waiting { task, since });
    }

    /// Stops counting a task as demand, e.g. once it has been scheduled.
    pub fn remove(&self, id: ResourceId) -> bool {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let before = items.len();
        items.retain(|w| w.task.id != id);
        items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DemandSource for WaitingQueue {
    fn waiting_since(&self, node: &dyn Computer) -> Option<DateTime<Utc>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| {
                w.task
                    .main_subtask()
                    .is_some_and(|main| main.label.as_ref().is_none_or(|l| l.contains(node)))
            })
            .map(|w| w.since)
            .min()
    }
}
