//! Task definition parsing.
//!
//! ```kdl
//! task "build" estimated-minutes=10 label="linux" {
//!     subtask "compile" same-node="K" workspace="/var/ws/build"
//!     subtask "package" same-node="K"
//!     subtask "lint" label="any"
//! }
//! ```
//!
//! A task without `subtask` children is a single sub-task of the same name.
//! The task's `label` applies to every sub-task that does not set its own.

use foreman_core::{Label, SubTask, Task};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::time::Duration;

use crate::kdl_util::{get_first_string_arg, get_string_prop, get_u32_prop};
use crate::{ConfigError, ConfigResult};

/// Parse every `task` node in a KDL document.
pub fn parse_tasks(kdl: &str) -> ConfigResult<Vec<Task>> {
    let doc: KdlDocument = kdl.parse()?;

    let mut tasks = Vec::new();
    let mut names = HashSet::new();
    for node in doc.nodes() {
        if node.name().value() != "task" {
            continue;
        }
        let task = parse_task(node)?;
        if !names.insert(task.name.clone()) {
            return Err(ConfigError::Duplicate(format!("task '{}'", task.name)));
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn parse_task(node: &KdlNode) -> ConfigResult<Task> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("task name".to_string()))?;
    let default_label = parse_label(node)?;

    let mut task = Task::new(name.clone());
    if let Some(minutes) = get_u32_prop(node, "estimated-minutes")? {
        task = task.with_estimated_duration(Duration::from_secs(u64::from(minutes) * 60));
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "subtask" {
                let mut subtask = parse_subtask(child)?;
                if subtask.label.is_none() {
                    subtask.label = default_label.clone();
                }
                task = task.with_subtask(subtask);
            }
        }
    }

    if task.subtasks.is_empty() {
        let mut main = parse_subtask_props(SubTask::new(name), node)?;
        main.label = default_label;
        task = task.with_subtask(main);
    }

    Ok(task)
}

fn parse_subtask(node: &KdlNode) -> ConfigResult<SubTask> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("subtask name".to_string()))?;
    let mut subtask = parse_subtask_props(SubTask::new(name), node)?;
    subtask.label = parse_label(node)?;
    Ok(subtask)
}

fn parse_subtask_props(mut subtask: SubTask, node: &KdlNode) -> ConfigResult<SubTask> {
    if let Some(key) = get_string_prop(node, "same-node") {
        subtask = subtask.on_same_node_as(key);
    }
    if let Some(last) = get_string_prop(node, "last-built-on") {
        subtask = subtask.with_last_built_on(last);
    }
    if let Some(path) = get_string_prop(node, "workspace") {
        subtask = subtask.with_workspace(path);
    }
    Ok(subtask)
}

fn parse_label(node: &KdlNode) -> ConfigResult<Option<Label>> {
    get_string_prop(node, "label")
        .map(|expr| Label::parse(&expr))
        .transpose()
        .map_err(ConfigError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::NodeId;
    use std::path::PathBuf;

    #[test]
    fn test_parse_task_with_subtasks() {
        let kdl = r#"
            node "ignored"

            task "build" estimated-minutes=10 label="linux" {
                subtask "compile" same-node="K" workspace="/var/ws/build" last-built-on="a"
                subtask "package" same-node="K"
                subtask "lint" label="mac || linux"
            }
        "#;

        let tasks = parse_tasks(kdl).unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.name, "build");
        assert_eq!(task.estimated_duration, Some(Duration::from_secs(600)));
        assert_eq!(task.subtasks.len(), 3);

        let compile = &task.subtasks[0];
        assert_eq!(compile.same_node_key.as_deref(), Some("K"));
        assert_eq!(compile.workspace, Some(PathBuf::from("/var/ws/build")));
        assert_eq!(compile.last_built_on, Some(NodeId::new("a")));
        assert_eq!(compile.label, Some(Label::atom("linux")));

        assert_eq!(
            task.subtasks[2].label.as_ref().map(ToString::to_string),
            Some("mac || linux".to_string())
        );
    }

    #[test]
    fn test_task_without_subtasks_is_its_own_main_work() {
        let tasks = parse_tasks(r#"task "lint" label="linux" workspace="/ws/lint""#).unwrap();
        let task = &tasks[0];
        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].name, "lint");
        assert_eq!(task.subtasks[0].label, Some(Label::atom("linux")));
        assert_eq!(task.subtasks[0].workspace, Some(PathBuf::from("/ws/lint")));
        assert_eq!(task.estimated_duration, None);
    }

    #[test]
    fn test_bad_label_is_a_config_error() {
        let result = parse_tasks(r#"task "t" label="linux &&""#);
        assert!(matches!(result, Err(ConfigError::Core(_))));
    }

    #[test]
    fn test_duplicate_task() {
        let result = parse_tasks(
            r#"
            task "t"
            task "t"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }
}
