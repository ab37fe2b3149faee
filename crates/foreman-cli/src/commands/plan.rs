//! Dry-run scheduling pass.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use foreman_config::parse_tasks;
use foreman_core::Task;
use foreman_scheduler::{
    Execution, ExhaustiveBalancer, GreedyBalancer, ReservationPredictor, Scheduler,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{load_config, pool};

#[derive(Serialize)]
struct TaskPlan {
    task: String,
    /// `None` when the task has to wait for executors.
    execution: Option<Execution>,
}

/// Schedules every configured task, in file order, against the configured nodes.
pub fn run(config_path: &Path, task_filter: Option<&str>, greedy: bool, json: bool) -> Result<()> {
    let (content, system) = load_config(config_path)?;
    let mut tasks = parse_tasks(&content)
        .with_context(|| format!("Failed to parse tasks: {}", config_path.display()))?;

    if let Some(name) = task_filter {
        tasks.retain(|t| t.name == name);
        if tasks.is_empty() {
            bail!("No task named '{}' in {}", name, config_path.display());
        }
    }

    let now = Utc::now();
    let predictor = ReservationPredictor::from_config(&system.reservations, now);
    let mut scheduler = Scheduler::new(pool::registry(&system), system.scheduler.clone())
        .with_predictor(Arc::new(predictor));
    if greedy {
        scheduler = scheduler.with_balancer(Arc::new(GreedyBalancer));
    }
    scheduler = scheduler.with_balancer(Arc::new(ExhaustiveBalancer));

    let mut plans = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task = Arc::new(task);
        let execution = scheduler.schedule(task.clone(), now)?;
        if !json {
            print_plan(&task, execution.as_ref());
        }
        plans.push(TaskPlan {
            task: task.name.clone(),
            execution,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
    }
    Ok(())
}

fn print_plan(task: &Task, execution: Option<&Execution>) {
    let Some(execution) = execution else {
        println!("{}: waiting for executors", task.name);
        return;
    };

    println!("{}", task.name);
    for unit in &execution.units {
        match &unit.workspace {
            Some(workspace) => println!(
                "  {} -> {} ({}) in {}",
                unit.subtask_name,
                unit.node,
                unit.slot,
                workspace.display()
            ),
            None => println!("  {} -> {} ({})", unit.subtask_name, unit.node, unit.slot),
        }
    }
    for &subtask in &execution.unplaced {
        println!("  {} -> not placed, retry next pass", task.subtasks[subtask].name);
    }
}
