//! Periodic retention checks.

use chrono::{DateTime, FixedOffset, Utc};
use foreman_config::NodeConfig;
use foreman_core::{Computer, NodeDirectory, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::SchedulerResult;
use crate::demand::DemandSource;
use crate::retention::{RetentionAction, RetentionCheck, RetentionPolicy};

struct ManagedNode {
    computer: Arc<dyn Computer>,
    policy: RetentionPolicy,
}

/// Applies each managed node's retention policy on a fixed period.
#[derive(Default)]
pub struct RetentionChecker {
    nodes: Vec<ManagedNode>,
}

impl RetentionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies for every configured node the directory knows. Nodes with
    /// demand retention watch `demand` for waiting work.
    pub fn from_config(
        configs: &[NodeConfig],
        directory: &dyn NodeDirectory,
        offset: FixedOffset,
        demand: &Arc<dyn DemandSource>,
    ) -> SchedulerResult<Self> {
        let mut checker = Self::new();
        for config in configs {
            let id = NodeId::new(config.name.clone());
            let Some(computer) = directory.resolve(&id) else {
                warn!(node = %id, "Configured node is not registered, not managing it");
                continue;
            };
            let policy = RetentionPolicy::from_config(&config.retention, offset, demand)?;
            checker.manage(computer, policy);
        }
        Ok(checker)
    }

    pub fn manage(&mut self, computer: Arc<dyn Computer>, policy: RetentionPolicy) {
        debug!(node = %computer.id(), policy = policy.name(), "Managing node retention");
        self.nodes.push(ManagedNode { computer, policy });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks every managed node once.
    pub fn check_all(&self, now: DateTime<Utc>) -> Vec<(NodeId, RetentionCheck)> {
        self.nodes
            .iter()
            .map(|managed| {
                let check = managed.policy.check(&managed.computer, now);
                if check.action != RetentionAction::Leave {
                    debug!(node = %managed.computer.id(), action = ?check.action, "Retention intent issued");
                }
                (managed.computer.id().clone(), check)
            })
            .collect()
    }

    /// Runs checks every `interval` until `shutdown` changes.
    ///
    /// Launches started by a check run detached; their outcome shows up on the
    /// next check.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            nodes = self.nodes.len(),
            interval_secs = interval.as_secs(),
            "Starting retention checker"
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all(Utc::now());
                }
                _ = shutdown.changed() => {
                    info!("Retention checker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::{NoDemand, WaitingQueue};
    use crate::nodes::NodeRegistry;
    use crate::testing::{FakeComputer, at};
    use chrono::Offset;
    use foreman_config::RetentionConfig;
    use foreman_core::{SubTask, Task};

    fn config(name: &str, retention: RetentionConfig) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            executors: 1,
            labels: Vec::new(),
            launch_supported: true,
            online: true,
            retention,
        }
    }

    #[tokio::test]
    async fn test_check_all_applies_each_policy() {
        let registry = NodeRegistry::new();
        let always = FakeComputer::new("always", 1);
        let manual = FakeComputer::new("manual", 1);
        let spare = FakeComputer::new("spare", 1);
        always.set_online(false);
        manual.set_online(false);
        spare.set_online(false);
        registry.register(always.clone());
        registry.register(manual.clone());
        registry.register(spare.clone());

        let queue = Arc::new(WaitingQueue::new());
        queue.enqueue(
            Arc::new(Task::new("t").with_subtask(SubTask::new("main"))),
            at(9, 0),
        );
        let demand: Arc<dyn DemandSource> = queue;

        let checker = RetentionChecker::from_config(
            &[
                config("always", RetentionConfig::Always),
                config("manual", RetentionConfig::Manual),
                config(
                    "spare",
                    RetentionConfig::Demand {
                        in_demand_minutes: 30,
                        idle_minutes: 10,
                    },
                ),
                config("missing", RetentionConfig::Always),
            ],
            &registry,
            Utc.fix(),
            &demand,
        )
        .unwrap();
        assert_eq!(checker.len(), 3);

        let checks = checker.check_all(at(10, 0));
        let actions: Vec<(String, RetentionAction)> = checks
            .iter()
            .map(|(id, check)| (id.to_string(), check.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("always".to_string(), RetentionAction::Launch),
                ("manual".to_string(), RetentionAction::Leave),
                ("spare".to_string(), RetentionAction::Launch),
            ]
        );

        for (_, check) in checks {
            if let Some(launch) = check.launch {
                launch.await.unwrap();
            }
        }
        assert!(always.is_online());
        assert!(manual.is_offline());
        assert!(spare.is_online());
    }

    #[test]
    fn test_bad_schedule_fails_construction() {
        let registry = NodeRegistry::new();
        registry.register(FakeComputer::new("a", 1));
        let result = RetentionChecker::from_config(
            &[config(
                "a",
                RetentionConfig::Scheduled {
                    schedule: "not a schedule".to_string(),
                    up_minutes: 10,
                    keep_up_when_active: false,
                },
            )],
            &registry,
            Utc.fix(),
            &(Arc::new(NoDemand) as Arc<dyn DemandSource>),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_checks_until_shutdown() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);
        node.fail_connects();

        let mut checker = RetentionChecker::new();
        checker.manage(node.clone(), RetentionPolicy::Always);
        let checker = Arc::new(checker);

        let (tx, rx) = watch::channel(false);
        let handle = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.run(Duration::from_millis(10), rx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        // every tick retried the failing launch
        assert!(node.connects() >= 2);
    }
}
