//! Workspace leases.
//!
//! Two work units must never share a working directory on the same node. A
//! [`WorkspaceList`] records which concrete paths are leased and hands out
//! `path@2`, `path@3`, ... when the requested one is taken.

use foreman_core::NodeId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::{SchedulerError, SchedulerResult};

/// Leased paths on one node.
#[derive(Debug, Default)]
pub struct WorkspaceList {
    leased: Mutex<HashSet<PathBuf>>,
    /// Wakes threads blocked in [`WorkspaceList::acquire`].
    released: Condvar,
    /// Wakes tasks waiting in [`WorkspaceList::acquire_async`].
    released_async: Notify,
}

impl WorkspaceList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.leased.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases the first free variant of `base`. Never blocks.
    pub fn allocate(&self, base: impl AsRef<Path>) -> PathBuf {
        let base = base.as_ref();
        let mut leased = self.lock();
        let mut n = 1;
        loop {
            let candidate = variant(base, n);
            if !leased.contains(&candidate) {
                debug!(workspace = %candidate.display(), "Allocated workspace");
                leased.insert(candidate.clone());
                return candidate;
            }
            n += 1;
        }
    }

    /// Leases `path` if nobody holds it.
    pub fn try_acquire(&self, path: impl AsRef<Path>) -> bool {
        self.lock().insert(path.as_ref().to_path_buf())
    }

    /// Blocks the calling thread until `path` is free, then leases it.
    pub fn acquire(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let mut leased = self.lock();
        while leased.contains(path) {
            debug!(workspace = %path.display(), "Waiting for workspace");
            leased = self
                .released
                .wait(leased)
                .unwrap_or_else(PoisonError::into_inner);
        }
        leased.insert(path.to_path_buf());
        path.to_path_buf()
    }

    /// Waits until `path` is free, then leases it.
    ///
    /// Dropping the future before it completes leaves the leased set untouched.
    pub async fn acquire_async(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        loop {
            let notified = self.released_async.notified();
            tokio::pin!(notified);
            // register before checking so a release in between is not missed
            notified.as_mut().enable();

            if self.try_acquire(path) {
                return path.to_path_buf();
            }
            notified.await;
        }
    }

    /// Ends a lease and wakes every waiter.
    ///
    /// Releasing a path that is not leased means the caller's bookkeeping is
    /// broken; it is reported as [`SchedulerError::LeaseNotHeld`].
    pub fn release(&self, path: impl AsRef<Path>) -> SchedulerResult<()> {
        let path = path.as_ref();
        let removed = self.lock().remove(path);
        if !removed {
            error!(workspace = %path.display(), "Released a workspace that was not leased");
            return Err(SchedulerError::LeaseNotHeld(path.to_path_buf()));
        }

        debug!(workspace = %path.display(), "Released workspace");
        self.released.notify_all();
        self.released_async.notify_waiters();
        Ok(())
    }

    pub fn is_leased(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains(path.as_ref())
    }

    /// Snapshot of the leased paths, sorted.
    pub fn leased(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}

fn variant(base: &Path, n: usize) -> PathBuf {
    if n == 1 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("@{n}"));
    PathBuf::from(name)
}

/// Workspace lists keyed by node.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    lists: Mutex<HashMap<NodeId, Arc<WorkspaceList>>>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_node(&self, node: &NodeId) -> Arc<WorkspaceList> {
        self.lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(node.clone())
            .or_default()
            .clone()
    }

    /// Drops the lists of nodes that are not `live` and hold no leases.
    pub fn prune(&self, live: impl Fn(&NodeId) -> bool) {
        self.lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|node, list| {
                let keep = live(node) || !list.lock().is_empty();
                if !keep {
                    debug!(node = %node, "Dropping workspace list of removed node");
                }
                keep
            });
    }

    /// Nodes that have a workspace list, sorted.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        nodes.sort();
        nodes
    }
}
