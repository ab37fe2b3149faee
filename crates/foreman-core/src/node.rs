//! Node identity and the computer interface the scheduler drives.
//!
//! A node is a machine that hosts executors. The scheduler never owns
//! connectivity; it observes a node through [`Computer`] and issues intents
//! (connect, stop accepting, disconnect) that the host carries out.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;

/// Name of a node. Unique within a controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Live view of a node and its executors.
#[async_trait]
pub trait Computer: Send + Sync {
    /// Name of the node this computer represents.
    fn id(&self) -> &NodeId;

    fn is_online(&self) -> bool;

    fn is_offline(&self) -> bool {
        !self.is_online()
    }

    /// True when no executor of this node is running anything.
    fn is_idle(&self) -> bool;

    fn is_accepting_tasks(&self) -> bool;

    fn set_accepting_tasks(&self, accepting: bool);

    /// Whether the controller is able to bring this node online by itself.
    fn is_launch_supported(&self) -> bool;

    /// Total number of executors, busy or not.
    fn count_executors(&self) -> usize;

    /// Whether the node carries the given label.
    fn has_label(&self, label: &str) -> bool;

    /// Start disconnecting the node. Returns immediately.
    fn disconnect(&self);

    /// Connect the node, resolving once the launch attempt has finished.
    async fn connect(&self, force_reconnect: bool) -> Result<()>;
}

/// Resolves node names to live computers.
///
/// A node removed between the moment a slot was offered and the moment the
/// scheduler looks it up resolves to `None`.
pub trait NodeDirectory: Send + Sync {
    fn resolve(&self, id: &NodeId) -> Option<Arc<dyn Computer>>;
}
