//! Scheduling passes over the node pool.

use chrono::{DateTime, TimeDelta, Utc};
use foreman_config::SchedulerSettings;
use foreman_core::Task;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::SchedulerResult;
use crate::balancer::{ExhaustiveBalancer, LoadBalancer};
use crate::forecast::LoadPredictor;
use crate::mapping::{Execution, WorkUnit, WorkUnitContext};
use crate::nodes::NodeRegistry;
use crate::slot::{SlotArena, SlotId};
use crate::workspace::WorkspaceRegistry;
use crate::worksheet::{MappingWorksheet, WorksheetContext};

/// Places tasks on idle executors.
///
/// Predictors and balancers are consulted in the order they were added. With
/// no balancer configured an [`ExhaustiveBalancer`] is used.
pub struct Scheduler {
    nodes: Arc<NodeRegistry>,
    arena: Arc<SlotArena>,
    predictors: Vec<Arc<dyn LoadPredictor>>,
    balancers: Vec<Arc<dyn LoadBalancer>>,
    workspaces: Arc<WorkspaceRegistry>,
    settings: SchedulerSettings,
}

impl Scheduler {
    /// Creates a scheduler with one slot per executor of every registered node.
    ///
    /// Nodes registered later are picked up by the next [`Scheduler::offers`].
    pub fn new(nodes: Arc<NodeRegistry>, settings: SchedulerSettings) -> Self {
        let arena = Arc::new(SlotArena::for_nodes(&nodes.all()));
        Self {
            nodes,
            arena,
            predictors: Vec::new(),
            balancers: Vec::new(),
            workspaces: Arc::new(WorkspaceRegistry::new()),
            settings,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn LoadPredictor>) -> Self {
        self.predictors.push(predictor);
        self
    }

    pub fn with_balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancers.push(balancer);
        self
    }

    pub fn nodes(&self) -> &Arc<NodeRegistry> {
        &self.nodes
    }

    pub fn arena(&self) -> &Arc<SlotArena> {
        &self.arena
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceRegistry> {
        &self.workspaces
    }

    /// Idle slots on nodes that are online and accepting tasks.
    ///
    /// Nodes registered since the last pass get their slots here, and
    /// workspace lists of removed nodes are dropped once nothing is leased.
    pub fn offers(&self) -> Vec<SlotId> {
        let nodes = self.nodes.all();
        self.arena.sync(&nodes);
        self.workspaces.prune(|id| nodes.iter().any(|node| node.id() == id));

        self.arena
            .slots()
            .iter()
            .filter(|slot| slot.is_available())
            .filter(|slot| {
                nodes.iter().any(|node| {
                    slot.is_active_on(node.as_ref())
                        && node.is_online()
                        && node.is_accepting_tasks()
                })
            })
            .map(|slot| slot.id())
            .collect()
    }

    /// The placement problem for `task` against the current offers.
    pub fn worksheet(&self, task: Arc<Task>, now: DateTime<Utc>) -> MappingWorksheet {
        let offers = self.offers();
        let ctx = WorksheetContext {
            arena: &self.arena,
            nodes: self.nodes.as_ref(),
            predictors: &self.predictors,
            now,
            forecast_horizon: TimeDelta::from_std(self.settings.forecast_horizon)
                .unwrap_or(TimeDelta::minutes(15)),
        };
        MappingWorksheet::new(task, &offers, &ctx)
    }

    /// Runs one scheduling pass for `task`.
    ///
    /// Returns `None` when no balancer found a placement; the task should be
    /// retried on a later pass. Sub-tasks listed as unplaced in the execution
    /// lost their slots to a concurrent pass and also need a retry.
    pub fn schedule(&self, task: Arc<Task>, now: DateTime<Utc>) -> SchedulerResult<Option<Execution>> {
        let worksheet = self.worksheet(task, now);
        let task = worksheet.task();
        let ctx = WorkUnitContext::with_workspaces(&self.workspaces);

        let default_balancer: [Arc<dyn LoadBalancer>; 1] = [Arc::new(ExhaustiveBalancer)];
        let balancers = if self.balancers.is_empty() {
            &default_balancer[..]
        } else {
            &self.balancers[..]
        };

        for balancer in balancers {
            let Some(mapping) = balancer.map(&worksheet) else {
                debug!(task = %task.name, balancer = balancer.name(), "Balancer found no mapping");
                continue;
            };

            let execution = mapping.execute(&ctx)?;
            info!(
                task = %task.name,
                balancer = balancer.name(),
                units = execution.units.len(),
                unplaced = execution.unplaced.len(),
                "Scheduled task"
            );
            return Ok(Some(execution));
        }

        info!(task = %task.name, offers = worksheet.executors().len(), "Task cannot be placed yet");
        Ok(None)
    }

    /// Frees the slot and workspace lease held by a finished work unit.
    pub fn complete(&self, unit: &WorkUnit) -> SchedulerResult<()> {
        let slot = self.arena.slot(unit.slot)?;
        if !slot.release() {
            warn!(slot = %unit.slot, node = %unit.node, "Completed work unit held a free slot");
        }

        if let Some(workspace) = &unit.workspace {
            self.workspaces.for_node(&unit.node).release(workspace)?;
        }

        debug!(subtask = %unit.subtask_name, node = %unit.node, "Work unit completed");
        Ok(())
    }
}
