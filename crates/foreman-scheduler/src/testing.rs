//! Fakes shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use foreman_core::{Computer, Error, NodeId, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 2024-03-04 (a Monday) at the given wall-clock time, UTC.
pub(crate) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

pub(crate) struct FakeComputer {
    id: NodeId,
    executors: usize,
    labels: Vec<String>,
    online: AtomicBool,
    idle: AtomicBool,
    accepting: AtomicBool,
    launch_supported: AtomicBool,
    fail_connects: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeComputer {
    pub(crate) fn new(name: &str, executors: usize) -> Arc<Self> {
        Self::with_labels(name, executors, &[])
    }

    pub(crate) fn with_labels(name: &str, executors: usize, labels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(name),
            executors,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            online: AtomicBool::new(true),
            idle: AtomicBool::new(true),
            accepting: AtomicBool::new(true),
            launch_supported: AtomicBool::new(true),
            fail_connects: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    pub(crate) fn set_launch_supported(&self, supported: bool) {
        self.launch_supported.store(supported, Ordering::SeqCst);
    }

    pub(crate) fn fail_connects(&self) {
        self.fail_connects.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Computer for FakeComputer {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn is_accepting_tasks(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn set_accepting_tasks(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    fn is_launch_supported(&self) -> bool {
        self.launch_supported.load(Ordering::SeqCst)
    }

    fn count_executors(&self) -> usize {
        self.executors
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.online.store(false, Ordering::SeqCst);
    }

    async fn connect(&self, _force_reconnect: bool) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::LaunchFailed(format!("{} refused", self.id)));
        }
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }
}
