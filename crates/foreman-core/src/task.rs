//! Tasks and their schedulable sub-units.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::label::Label;
use crate::node::NodeId;
use crate::ResourceId;

/// One indivisible unit of work belonging to a [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    /// Display name.
    pub name: String,
    /// Nodes this sub-task may run on. `None` means anywhere.
    pub label: Option<Label>,
    /// Sub-tasks sharing a key must run on the same node.
    pub same_node_key: Option<String>,
    /// Node the previous run used; preferred when still available.
    pub last_built_on: Option<NodeId>,
    /// Working directory to lease on the chosen node before the run starts.
    pub workspace: Option<PathBuf>,
}

impl SubTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            same_node_key: None,
            last_built_on: None,
            workspace: None,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn on_same_node_as(mut self, key: impl Into<String>) -> Self {
        self.same_node_key = Some(key.into());
        self
    }

    pub fn with_last_built_on(mut self, node: impl Into<NodeId>) -> Self {
        self.last_built_on = Some(node.into());
        self
    }

    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }
}

/// A unit of schedulable work, decomposed into sub-tasks.
///
/// The first sub-task is the main work. It always ends up in the first work
/// chunk of a placement problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: ResourceId,
    pub name: String,
    /// Expected run time. `None` or zero disables load forecasting.
    pub estimated_duration: Option<Duration>,
    pub subtasks: Vec<SubTask>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            estimated_duration: None,
            subtasks: Vec::new(),
        }
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    pub fn with_subtask(mut self, subtask: SubTask) -> Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn main_subtask(&self) -> Option<&SubTask> {
        self.subtasks.first()
    }

    /// Estimated duration if it is known and non-zero.
    pub fn forecast_duration(&self) -> Option<Duration> {
        self.estimated_duration.filter(|d| !d.is_zero())
    }
}
