//! Nodes described by configuration.
//!
//! The CLI has no agents to talk to, so each configured node is simulated:
//! connecting flips it online when launching is supported.

use async_trait::async_trait;
use foreman_config::{NodeConfig, SystemConfig};
use foreman_core::{Computer, Error, NodeId, Result};
use foreman_scheduler::NodeRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ConfiguredNode {
    id: NodeId,
    executors: usize,
    labels: HashSet<String>,
    launch_supported: bool,
    online: AtomicBool,
    accepting: AtomicBool,
}

impl ConfiguredNode {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            id: NodeId::new(config.name.clone()),
            executors: config.executors,
            labels: config.labels.iter().cloned().collect(),
            launch_supported: config.launch_supported,
            online: AtomicBool::new(config.online),
            accepting: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Computer for ConfiguredNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn is_accepting_tasks(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn set_accepting_tasks(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    fn is_launch_supported(&self) -> bool {
        self.launch_supported
    }

    fn count_executors(&self) -> usize {
        self.executors
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    fn disconnect(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    async fn connect(&self, _force_reconnect: bool) -> Result<()> {
        if !self.launch_supported {
            return Err(Error::LaunchFailed(format!("{} cannot be launched", self.id)));
        }
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Registry holding one simulated node per configured node.
pub fn registry(system: &SystemConfig) -> Arc<NodeRegistry> {
    let registry = Arc::new(NodeRegistry::new());
    for node in &system.nodes {
        registry.register(Arc::new(ConfiguredNode::new(node)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_config::RetentionConfig;

    fn config(launch_supported: bool) -> NodeConfig {
        NodeConfig {
            name: "linux-1".to_string(),
            executors: 2,
            labels: vec!["linux".to_string()],
            launch_supported,
            online: false,
            retention: RetentionConfig::Always,
        }
    }

    #[tokio::test]
    async fn test_configured_node_connects() {
        let node = ConfiguredNode::new(&config(true));
        assert!(node.is_offline());
        assert!(node.has_label("linux"));
        assert_eq!(node.count_executors(), 2);

        node.connect(true).await.unwrap();
        assert!(node.is_online());
        node.disconnect();
        assert!(node.is_offline());
    }

    #[tokio::test]
    async fn test_unlaunchable_node_fails_to_connect() {
        let node = ConfiguredNode::new(&config(false));
        assert!(node.connect(true).await.is_err());
        assert!(node.is_offline());
    }
}
