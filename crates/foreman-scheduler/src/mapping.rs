//! Solutions to a placement problem.

use foreman_core::{NodeId, ResourceId, Task};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::slot::SlotId;
use crate::workspace::WorkspaceRegistry;
use crate::worksheet::{ExecutorChunk, MappingWorksheet};
use crate::{SchedulerError, SchedulerResult};

/// A sub-task bound to an executor slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkUnit {
    pub id: ResourceId,
    pub task_id: ResourceId,
    /// Index of the sub-task within its task.
    pub subtask: usize,
    pub subtask_name: String,
    pub node: NodeId,
    pub slot: SlotId,
    /// Leased working directory, for sub-tasks that declare one.
    pub workspace: Option<PathBuf>,
}

impl WorkUnit {
    pub fn is_main_work(&self) -> bool {
        self.subtask == 0
    }
}

/// Creates work units as a mapping is executed.
#[derive(Default)]
pub struct WorkUnitContext<'a> {
    workspaces: Option<&'a WorkspaceRegistry>,
}

impl<'a> WorkUnitContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease declared workspaces from the node's workspace list.
    pub fn with_workspaces(workspaces: &'a WorkspaceRegistry) -> Self {
        Self {
            workspaces: Some(workspaces),
        }
    }

    fn create_work_unit(&self, task: &Task, subtask: usize, node: &NodeId, slot: SlotId) -> WorkUnit {
        let sub = &task.subtasks[subtask];
        let workspace = match (&sub.workspace, self.workspaces) {
            (Some(path), Some(registry)) => Some(registry.for_node(node).allocate(path)),
            (declared, _) => declared.clone(),
        };

        let unit = WorkUnit {
            id: ResourceId::new(),
            task_id: task.id,
            subtask,
            subtask_name: sub.name.clone(),
            node: node.clone(),
            slot,
            workspace,
        };
        info!(
            unit = %unit.id.short(),
            task = %task.name,
            subtask = %unit.subtask_name,
            node = %unit.node,
            slot = %unit.slot,
            "Assigned work unit"
        );
        unit
    }
}

/// Outcome of executing a mapping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Execution {
    pub units: Vec<WorkUnit>,
    /// Sub-tasks left for the next pass because their slots were taken meanwhile.
    pub unplaced: Vec<usize>,
}

impl Execution {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }
}

/// An assignment of work chunks to executor chunks, possibly partial.
#[derive(Clone)]
pub struct Mapping<'w> {
    worksheet: &'w MappingWorksheet,
    /// For each work chunk, the index of its executor chunk.
    assigned: Vec<Option<usize>>,
}

impl<'w> Mapping<'w> {
    pub fn new(worksheet: &'w MappingWorksheet) -> Self {
        Self {
            worksheet,
            assigned: vec![None; worksheet.works().len()],
        }
    }

    pub fn worksheet(&self) -> &'w MappingWorksheet {
        self.worksheet
    }

    /// Number of work chunks needing an assignment.
    pub fn size(&self) -> usize {
        self.assigned.len()
    }

    /// Assigns work chunk `work` to executor chunk `executor`, returning the
    /// previous assignment.
    pub fn assign(&mut self, work: usize, executor: Option<usize>) -> Option<usize> {
        std::mem::replace(&mut self.assigned[work], executor)
    }

    pub fn assigned(&self, work: usize) -> Option<&'w ExecutorChunk> {
        let worksheet = self.worksheet;
        self.assigned[work].and_then(|e| worksheet.executors().get(e))
    }

    /// Executor chunk index per work chunk.
    pub fn assignments(&self) -> &[Option<usize>] {
        &self.assigned
    }

    /// Checks the assignments made so far against label and capacity constraints.
    pub fn is_partially_valid(&self) -> bool {
        let executors = self.worksheet.executors();
        let mut used = vec![0usize; executors.len()];
        for (i, assigned) in self.assigned.iter().enumerate() {
            let Some(e) = *assigned else { continue };
            let Some(chunk) = executors.get(e) else {
                return false;
            };
            let work = self.worksheet.work(i);
            if !chunk.can_accept(work) {
                return false;
            }
            used[e] += work.size();
            if used[e] > chunk.capacity() {
                return false;
            }
        }
        true
    }

    /// Every work chunk is assigned and all constraints hold.
    pub fn is_completely_valid(&self) -> bool {
        self.assigned.iter().all(Option::is_some) && self.is_partially_valid()
    }

    /// Claims slots for every sub-task as this mapping dictates.
    ///
    /// Slots taken by someone else since the worksheet was built are skipped.
    /// When a work chunk runs out of slots its remaining sub-tasks are reported
    /// as unplaced; claims already made stand.
    pub fn execute(&self, ctx: &WorkUnitContext<'_>) -> SchedulerResult<Execution> {
        let task = self.worksheet.task();
        if !self.is_completely_valid() {
            error!(task = %task.name, mapping = ?self, "Refusing to execute an invalid mapping");
            return Err(SchedulerError::InvalidMapping(task.name.clone()));
        }

        let arena = self.worksheet.arena();
        let mut execution = Execution::default();

        for (i, work) in self.worksheet.works().iter().enumerate() {
            let chunk = self
                .assigned(i)
                .ok_or_else(|| SchedulerError::InvalidMapping(task.name.clone()))?;
            let mut slots = chunk.slots().iter();

            for (n, &subtask) in work.subtasks().iter().enumerate() {
                let claimed = slots
                    .by_ref()
                    .find(|&&id| arena.get(id).is_some_and(|slot| slot.try_claim()));
                match claimed {
                    Some(&slot) => {
                        execution
                            .units
                            .push(ctx.create_work_unit(task, subtask, chunk.name(), slot));
                    }
                    None => {
                        let remaining = &work.subtasks()[n..];
                        warn!(
                            task = %task.name,
                            node = %chunk.name(),
                            remaining = remaining.len(),
                            "Executor slots were taken before they could be claimed"
                        );
                        execution.unplaced.extend_from_slice(remaining);
                        break;
                    }
                }
            }
        }

        Ok(execution)
    }
}

impl fmt::Debug for Mapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                (0..self.assigned.len()).map(|i| self.assigned(i).map(|chunk| chunk.name().clone())),
            )
            .finish()
    }
}
