//! The placement problem: where should each part of a task run?
//!
//! A task is a list of sub-tasks; the pool is a list of idle executor slots.
//! Two constraints shape the answer:
//!
//! - sub-tasks sharing a same-node key must land on one node;
//! - a sub-task with a label may only run on nodes satisfying it.
//!
//! The first constraint is folded into the problem itself: co-located
//! sub-tasks form one [`WorkChunk`], and all offered slots of a node form one
//! [`ExecutorChunk`]. What remains is a matching from work chunks to executor
//! chunks, represented by [`Mapping`](crate::mapping::Mapping) and searched by a
//! [`LoadBalancer`](crate::balancer::LoadBalancer).

use chrono::{DateTime, TimeDelta, Utc};
use foreman_core::{Computer, Label, NodeDirectory, NodeId, SubTask, Task};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::forecast::{LoadPredictor, forecast_peak};
use crate::slot::{SlotArena, SlotId};

/// Everything a worksheet needs besides the task and the offered slots.
pub struct WorksheetContext<'a> {
    pub arena: &'a Arc<SlotArena>,
    pub nodes: &'a dyn NodeDirectory,
    pub predictors: &'a [Arc<dyn LoadPredictor>],
    pub now: DateTime<Utc>,
    /// Forecasts never look further ahead than this, even for long tasks.
    pub forecast_horizon: TimeDelta,
}

/// All offered slots of one node.
pub struct ExecutorChunk {
    index: usize,
    node: Arc<dyn Computer>,
    slots: Vec<SlotId>,
}

impl ExecutorChunk {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn node(&self) -> &Arc<dyn Computer> {
        &self.node
    }

    pub fn name(&self) -> &NodeId {
        self.node.id()
    }

    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    /// Number of slots in this chunk.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Can the work chunk run here?
    pub fn can_accept(&self, work: &WorkChunk) -> bool {
        self.capacity() >= work.size()
            && work
                .label
                .as_ref()
                .is_none_or(|label| label.contains(self.node.as_ref()))
    }
}

impl fmt::Debug for ExecutorChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorChunk")
            .field("index", &self.index)
            .field("node", self.node.id())
            .field("slots", &self.slots)
            .finish()
    }
}

/// Sub-tasks that must run together on one node.
#[derive(Debug, Clone)]
pub struct WorkChunk {
    index: usize,
    /// Indices into the task's sub-tasks.
    subtasks: Vec<usize>,
    label: Option<Label>,
    last_built_on: Option<usize>,
}

impl WorkChunk {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn subtasks(&self) -> &[usize] {
        &self.subtasks
    }

    pub fn size(&self) -> usize {
        self.subtasks.len()
    }

    /// Label every member must satisfy. `None` means anywhere.
    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    /// Executor chunk on the node this work last ran on, if it is in the pool.
    pub fn last_built_on(&self) -> Option<usize> {
        self.last_built_on
    }
}

/// A placement problem for one task.
pub struct MappingWorksheet {
    task: Arc<Task>,
    arena: Arc<SlotArena>,
    executors: Vec<ExecutorChunk>,
    works: Vec<WorkChunk>,
}

impl MappingWorksheet {
    pub fn new(task: Arc<Task>, offers: &[SlotId], ctx: &WorksheetContext<'_>) -> Self {
        let executors = build_executor_chunks(&task, offers, ctx);
        let works = build_work_chunks(&task.subtasks, &executors);

        debug!(
            task = %task.name,
            executor_chunks = executors.len(),
            work_chunks = works.len(),
            "Built mapping worksheet"
        );

        Self {
            task,
            arena: ctx.arena.clone(),
            executors,
            works,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn arena(&self) -> &Arc<SlotArena> {
        &self.arena
    }

    pub fn executors(&self) -> &[ExecutorChunk] {
        &self.executors
    }

    pub fn works(&self) -> &[WorkChunk] {
        &self.works
    }

    pub fn executor(&self, index: usize) -> &ExecutorChunk {
        &self.executors[index]
    }

    pub fn work(&self, index: usize) -> &WorkChunk {
        &self.works[index]
    }

    pub fn subtask(&self, index: usize) -> &SubTask {
        &self.task.subtasks[index]
    }

    /// Executor chunks able to take `work`, in the order they were built.
    pub fn applicable_executor_chunks(&self, work: &WorkChunk) -> Vec<&ExecutorChunk> {
        self.executors
            .iter()
            .filter(|e| e.can_accept(work))
            .collect()
    }
}

fn build_executor_chunks(
    task: &Task,
    offers: &[SlotId],
    ctx: &WorksheetContext<'_>,
) -> Vec<ExecutorChunk> {
    // group offered slots by node, keeping the order nodes first appear in
    let mut groups: Vec<(NodeId, Vec<SlotId>)> = Vec::new();
    let mut positions: HashMap<NodeId, usize> = HashMap::new();
    for &id in offers {
        let Some(slot) = ctx.arena.get(id) else {
            debug!(slot = %id, "Ignoring offer of unknown slot");
            continue;
        };
        let position = *positions.entry(slot.node().clone()).or_insert_with(|| {
            groups.push((slot.node().clone(), Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(id);
    }

    let horizon = task.forecast_duration().map(|duration| {
        TimeDelta::from_std(duration)
            .unwrap_or(ctx.forecast_horizon)
            .min(ctx.forecast_horizon)
    });

    let mut executors = Vec::with_capacity(groups.len());
    for (node_id, mut slots) in groups {
        let Some(node) = ctx.nodes.resolve(&node_id) else {
            debug!(node = %node_id, "Dropping offers from a node that is gone");
            continue;
        };

        // hold back executors that forecast demand will need while this task runs
        if let Some(horizon) = horizon {
            let peak = forecast_peak(ctx.predictors, node.as_ref(), ctx.now, horizon) as usize;
            let min_idle = node.count_executors().saturating_sub(peak);
            if min_idle < slots.len() {
                debug!(
                    node = %node_id,
                    offered = slots.len(),
                    peak,
                    kept = min_idle,
                    "Reducing offered executors by forecast load"
                );
                slots.truncate(min_idle);
            }
        }

        if slots.is_empty() {
            continue;
        }
        executors.push(ExecutorChunk {
            index: executors.len(),
            node,
            slots,
        });
    }
    executors
}

fn build_work_chunks(subtasks: &[SubTask], executors: &[ExecutorChunk]) -> Vec<WorkChunk> {
    // insertion order keeps the main sub-task in chunk 0
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut keyed: HashMap<&str, usize> = HashMap::new();
    for (i, subtask) in subtasks.iter().enumerate() {
        match subtask.same_node_key.as_deref() {
            Some(key) => match keyed.get(key) {
                Some(&group) => groups[group].push(i),
                None => {
                    keyed.insert(key, groups.len());
                    groups.push(vec![i]);
                }
            },
            None => groups.push(vec![i]),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, members)| {
            let first = &subtasks[members[0]];
            let last_built_on = first
                .last_built_on
                .as_ref()
                .and_then(|node| executors.iter().position(|e| e.name() == node));
            WorkChunk {
                index,
                label: first.label.clone(),
                last_built_on,
                subtasks: members,
            }
        })
        .collect()
}
