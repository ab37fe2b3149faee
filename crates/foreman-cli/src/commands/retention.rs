//! Retention checks against configured nodes.

use anyhow::{Context, Result};
use chrono::Utc;
use foreman_config::parse_tasks;
use foreman_core::Computer;
use foreman_scheduler::{DemandSource, RetentionChecker, WaitingQueue};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use super::{load_config, pool};

/// Configured tasks count as waiting from the moment the command starts, so
/// nodes with demand retention launch once their in-demand delay has passed.
pub async fn run(config_path: &Path, follow: bool) -> Result<()> {
    let (content, system) = load_config(config_path)?;
    let tasks = parse_tasks(&content)
        .with_context(|| format!("Failed to parse tasks: {}", config_path.display()))?;

    let started = Utc::now();
    let queue = Arc::new(WaitingQueue::new());
    for task in tasks {
        queue.enqueue(Arc::new(task), started);
    }
    let demand: Arc<dyn DemandSource> = queue;

    let registry = pool::registry(&system);
    let checker = RetentionChecker::from_config(
        &system.nodes,
        registry.as_ref(),
        system.scheduler.utc_offset(),
        &demand,
    )?;

    if follow {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for interrupt");
            }
            let _ = shutdown_tx.send(true);
        });
        checker
            .run(system.scheduler.check_interval, shutdown_rx)
            .await;
        return Ok(());
    }

    for (node, check) in checker.check_all(Utc::now()) {
        if let Some(launch) = check.launch {
            launch.await?;
        }
        let state = match registry.get(&node) {
            Some(computer) if computer.is_online() => "online",
            Some(_) => "offline",
            None => "gone",
        };
        println!("{node}: {:?} ({state})", check.action);
    }
    Ok(())
}
