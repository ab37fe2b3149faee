//! Node retention: when should a node be connected?
//!
//! A [`RetentionPolicy`] is consulted periodically for each node and issues
//! connectivity intents (launch, stop accepting, disconnect). Scheduled
//! retention keeps a node up for a fixed number of minutes after every minute
//! matching a cron-style schedule. Demand retention keeps a node offline until
//! work has waited for it, and takes it down again once it sits idle.

use chrono::{DateTime, DurationRound, FixedOffset, Offset, TimeDelta, Utc};
use foreman_config::{ConfigError, CronTabList, MAX_UP_MINUTES, RetentionConfig};
use foreman_core::Computer;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::SchedulerResult;
use crate::demand::DemandSource;

/// Lookahead cap when searching for the next window.
const MAX_LOOKAHEAD_MINUTES: i64 = 15;

/// The current and upcoming up-time windows of a node.
///
/// Windows are open intervals: a node is scheduled online strictly between
/// start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityWindow {
    pub last_start: DateTime<Utc>,
    pub last_stop: DateTime<Utc>,
    pub next_start: DateTime<Utc>,
    pub next_stop: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        (self.last_start < now && now < self.last_stop)
            || (self.next_start < now && now < self.next_stop)
    }
}

/// Up-time windows driven by a cron-style schedule.
#[derive(Debug)]
pub struct ScheduledRetention {
    spec: String,
    tabs: CronTabList,
    up_time: TimeDelta,
    keep_up_when_active: bool,
    /// Schedules are matched against wall-clock time at this offset.
    offset: FixedOffset,
    window: Mutex<Option<AvailabilityWindow>>,
}

impl ScheduledRetention {
    /// Up-time below one minute is raised to one minute. Up-time above
    /// [`MAX_UP_MINUTES`] is rejected.
    pub fn new(spec: &str, up_minutes: u32, keep_up_when_active: bool) -> SchedulerResult<Self> {
        if up_minutes > MAX_UP_MINUTES {
            return Err(ConfigError::InvalidValue {
                field: "up-minutes".to_string(),
                message: format!("at most {MAX_UP_MINUTES} minutes, got {up_minutes}"),
            }
            .into());
        }
        let tabs = CronTabList::parse(spec)?;
        if let Some(warning) = tabs.check_sanity() {
            warn!(schedule = spec, "{warning}");
        }

        Ok(Self {
            spec: spec.to_string(),
            tabs,
            up_time: TimeDelta::minutes(i64::from(up_minutes.max(1))),
            keep_up_when_active,
            offset: Utc.fix(),
            window: Mutex::new(None),
        })
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn up_minutes(&self) -> i64 {
        self.up_time.num_minutes()
    }

    pub fn keep_up_when_active(&self) -> bool {
        self.keep_up_when_active
    }

    fn matches(&self, minute: DateTime<Utc>) -> bool {
        self.tabs.check(&minute.with_timezone(&self.offset))
    }

    /// Windows as of `now`, computing or advancing them as needed.
    pub fn window(&self, now: DateTime<Utc>) -> AvailabilityWindow {
        let mut state = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let mut window = match *state {
            Some(window) => window,
            None => self.initial_window(now),
        };
        self.refresh_if_expired(&mut window, now);
        *state = Some(window);
        window
    }

    pub fn is_currently_scheduled_online(&self, now: DateTime<Utc>) -> bool {
        self.window(now).contains(now)
    }

    fn initial_window(&self, now: DateTime<Utc>) -> AvailabilityWindow {
        let now_minute = truncate_to_minute(now);

        // only a start within the last up-time can still be open
        let mut last_match = None;
        let mut minute = now_minute - self.up_time - TimeDelta::minutes(1);
        while minute <= now_minute {
            if self.matches(minute) {
                last_match = Some(minute);
            }
            minute += TimeDelta::minutes(1);
        }

        let (start, stop) = match last_match {
            Some(start) => (start, start + self.up_time),
            None => (now - self.up_time * 3, now - self.up_time * 2),
        };
        debug!(schedule = %self.spec, %start, %stop, "Initialized availability window");
        AvailabilityWindow {
            last_start: start,
            last_stop: stop,
            next_start: start,
            next_stop: stop,
        }
    }

    fn refresh_if_expired(&self, window: &mut AvailabilityWindow, now: DateTime<Utc>) {
        let lookahead = self.up_time.min(TimeDelta::minutes(MAX_LOOKAHEAD_MINUTES));
        let stop_looking = now + lookahead;

        while window.next_stop < now {
            window.last_start = window.next_start;
            window.last_stop = window.next_stop;

            let mut minute = truncate_to_minute(window.next_stop);
            let mut found = None;
            while minute < stop_looking {
                if self.matches(minute) {
                    found = Some(minute);
                    break;
                }
                minute += TimeDelta::minutes(1);
            }

            match found {
                Some(start) => {
                    window.next_start = start;
                    window.next_stop = start + self.up_time;
                    debug!(
                        schedule = %self.spec,
                        start = %window.next_start,
                        stop = %window.next_stop,
                        "Advanced availability window"
                    );
                }
                None => break,
            }
        }
    }
}

fn truncate_to_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::minutes(1)).unwrap_or(time)
}

/// Connectivity intent issued by a retention check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    /// Nothing to change.
    Leave,
    /// A background connect was started.
    Launch,
    /// The node keeps running its work but takes no new tasks.
    StopAccepting,
    Disconnect,
}

/// Result of one retention check.
#[derive(Debug)]
pub struct RetentionCheck {
    pub action: RetentionAction,
    /// Handle of the background connect, for [`RetentionAction::Launch`].
    pub launch: Option<JoinHandle<()>>,
}

impl RetentionCheck {
    fn action(action: RetentionAction) -> Self {
        Self {
            action,
            launch: None,
        }
    }
}

/// Launches a node when work has waited for it and disconnects it when idle.
pub struct DemandRetention {
    in_demand_delay: TimeDelta,
    idle_delay: TimeDelta,
    demand: Arc<dyn DemandSource>,
    /// Start of the node's current idle stretch, as first observed by a check.
    idle_since: Mutex<Option<DateTime<Utc>>>,
}

impl DemandRetention {
    pub fn new(in_demand_minutes: u32, idle_minutes: u32, demand: Arc<dyn DemandSource>) -> Self {
        Self {
            in_demand_delay: TimeDelta::minutes(i64::from(in_demand_minutes)),
            idle_delay: TimeDelta::minutes(i64::from(idle_minutes)),
            demand,
            idle_since: Mutex::new(None),
        }
    }

    pub fn in_demand_delay(&self) -> TimeDelta {
        self.in_demand_delay
    }

    pub fn idle_delay(&self) -> TimeDelta {
        self.idle_delay
    }

    fn check(&self, computer: &Arc<dyn Computer>, now: DateTime<Utc>) -> RetentionCheck {
        let node = computer.id();
        let mut idle_since = self.idle_since.lock().unwrap_or_else(PoisonError::into_inner);

        if computer.is_offline() {
            *idle_since = None;
            let Some(since) = self.demand.waiting_since(computer.as_ref()) else {
                return RetentionCheck::action(RetentionAction::Leave);
            };
            let waited = now - since;
            if waited <= self.in_demand_delay {
                return RetentionCheck::action(RetentionAction::Leave);
            }
            if !computer.is_launch_supported() {
                debug!(node = %node, "Node is in demand but cannot be launched");
                return RetentionCheck::action(RetentionAction::Leave);
            }
            info!(
                node = %node,
                waited_minutes = waited.num_minutes(),
                "Launching node as it has been in demand"
            );
            return launch(computer, false);
        }

        if !computer.is_idle() {
            *idle_since = None;
            return RetentionCheck::action(RetentionAction::Leave);
        }

        let idle = now - *idle_since.get_or_insert(now);
        if idle <= self.idle_delay {
            return RetentionCheck::action(RetentionAction::Leave);
        }
        info!(node = %node, idle_minutes = idle.num_minutes(), "Disconnecting node as it has been idle");
        *idle_since = None;
        computer.disconnect();
        RetentionCheck::action(RetentionAction::Disconnect)
    }
}

impl fmt::Debug for DemandRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandRetention")
            .field("in_demand_delay", &self.in_demand_delay)
            .field("idle_delay", &self.idle_delay)
            .finish_non_exhaustive()
    }
}

/// How a node's connectivity is managed.
#[derive(Debug)]
pub enum RetentionPolicy {
    /// Keep the node connected whenever it can be launched.
    Always,
    /// Leave connectivity to the operator.
    Manual,
    Scheduled(ScheduledRetention),
    Demand(DemandRetention),
}

impl RetentionPolicy {
    /// Builds the policy a node's configuration asks for. Demand policies
    /// consult `demand` for waiting work.
    pub fn from_config(
        config: &RetentionConfig,
        offset: FixedOffset,
        demand: &Arc<dyn DemandSource>,
    ) -> SchedulerResult<Self> {
        Ok(match config {
            RetentionConfig::Always => Self::Always,
            RetentionConfig::Manual => Self::Manual,
            RetentionConfig::Scheduled {
                schedule,
                up_minutes,
                keep_up_when_active,
            } => Self::Scheduled(
                ScheduledRetention::new(schedule, *up_minutes, *keep_up_when_active)?
                    .with_offset(offset),
            ),
            RetentionConfig::Demand {
                in_demand_minutes,
                idle_minutes,
            } => Self::Demand(DemandRetention::new(
                *in_demand_minutes,
                *idle_minutes,
                demand.clone(),
            )),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Manual => "manual",
            Self::Scheduled(_) => "scheduled",
            Self::Demand(_) => "demand",
        }
    }

    /// Whether an operator may bring the node online by hand right now.
    pub fn is_manual_launch_allowed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Scheduled(scheduled) => scheduled.is_currently_scheduled_online(now),
            Self::Always | Self::Manual | Self::Demand(_) => true,
        }
    }

    /// Reconciles the node's connectivity with this policy.
    ///
    /// Launches run in the background on the current tokio runtime. A failed
    /// launch is logged and retried by the next check.
    pub fn check(&self, computer: &Arc<dyn Computer>, now: DateTime<Utc>) -> RetentionCheck {
        match self {
            Self::Manual => RetentionCheck::action(RetentionAction::Leave),
            Self::Always => {
                if computer.is_offline() && computer.is_launch_supported() {
                    info!(node = %computer.id(), "Launching offline node");
                    launch(computer, false)
                } else {
                    RetentionCheck::action(RetentionAction::Leave)
                }
            }
            Self::Scheduled(scheduled) => check_scheduled(scheduled, computer, now),
            Self::Demand(demand) => demand.check(computer, now),
        }
    }
}

fn check_scheduled(
    scheduled: &ScheduledRetention,
    computer: &Arc<dyn Computer>,
    now: DateTime<Utc>,
) -> RetentionCheck {
    let node = computer.id();
    let should_be_online = scheduled.is_currently_scheduled_online(now);
    debug!(
        node = %node,
        online = computer.is_online(),
        should_be_online,
        "Checking node against schedule"
    );

    if should_be_online && computer.is_offline() {
        if !computer.is_launch_supported() {
            debug!(node = %node, "Node is scheduled online but cannot be launched");
            return RetentionCheck::action(RetentionAction::Leave);
        }
        info!(node = %node, "Launching node as its schedule says it should be online");
        return launch(computer, scheduled.keep_up_when_active());
    }

    if should_be_online || !computer.is_online() {
        return RetentionCheck::action(RetentionAction::Leave);
    }

    if !scheduled.keep_up_when_active() {
        info!(node = %node, "Disconnecting node as it has finished its scheduled uptime");
        computer.disconnect();
        return RetentionCheck::action(RetentionAction::Disconnect);
    }

    if computer.is_idle() {
        info!(node = %node, "Disconnecting idle node after its scheduled uptime");
        computer.disconnect();
        RetentionCheck::action(RetentionAction::Disconnect)
    } else if computer.is_accepting_tasks() {
        info!(node = %node, "Disabling new tasks on node as it has finished its scheduled uptime");
        computer.set_accepting_tasks(false);
        RetentionCheck::action(RetentionAction::StopAccepting)
    } else {
        // still draining work from the last window
        RetentionCheck::action(RetentionAction::Leave)
    }
}

fn launch(computer: &Arc<dyn Computer>, keep_up_when_active: bool) -> RetentionCheck {
    let Ok(runtime) = Handle::try_current() else {
        warn!(node = %computer.id(), "No async runtime to launch node on");
        return RetentionCheck::action(RetentionAction::Leave);
    };

    let computer = computer.clone();
    let handle = runtime.spawn(async move {
        let node = computer.id();
        if let Err(e) = computer.connect(true).await {
            warn!(node = %node, error = %e, "Failed to launch node");
            return;
        }
        if computer.is_online() {
            info!(node = %node, "Launched node");
        }
        if keep_up_when_active && computer.is_online() && !computer.is_accepting_tasks() {
            info!(node = %node, "Enabling new tasks on node as its uptime has started");
            computer.set_accepting_tasks(true);
        }
    });

    RetentionCheck {
        action: RetentionAction::Launch,
        launch: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use crate::demand::{NoDemand, WaitingQueue};
    use crate::testing::{FakeComputer, at};
    use foreman_core::{SubTask, Task};

    fn daily_nine(keep_up: bool) -> RetentionPolicy {
        RetentionPolicy::Scheduled(ScheduledRetention::new("0 9 * * *", 480, keep_up).unwrap())
    }

    fn as_computer(node: &Arc<FakeComputer>) -> Arc<dyn Computer> {
        node.clone()
    }

    fn no_demand() -> Arc<dyn DemandSource> {
        Arc::new(NoDemand)
    }

    fn on_demand(queue: &Arc<WaitingQueue>) -> RetentionPolicy {
        RetentionPolicy::Demand(DemandRetention::new(5, 10, queue.clone()))
    }

    #[test]
    fn test_window_containment() {
        let online = |hour, minute| {
            ScheduledRetention::new("0 9 * * *", 480, false)
                .unwrap()
                .is_currently_scheduled_online(at(hour, minute))
        };
        assert!(online(10, 0));
        assert!(!online(8, 0));
        assert!(!online(17, 30));
    }

    #[test]
    fn test_window_advances_over_time() {
        let retention = ScheduledRetention::new("0 9 * * *", 480, false).unwrap();
        assert!(!retention.is_currently_scheduled_online(at(8, 0)));
        assert!(retention.is_currently_scheduled_online(at(9, 30)));

        let window = retention.window(at(9, 30));
        assert_eq!(window.next_start, at(9, 0));
        assert_eq!(window.next_stop, at(17, 0));
        assert!(!retention.is_currently_scheduled_online(at(17, 30)));
    }

    #[test]
    fn test_window_catches_up_after_long_gap() {
        let retention = ScheduledRetention::new("0 * * * *", 10, false).unwrap();
        assert!(retention.is_currently_scheduled_online(at(10, 5)));
        assert!(!retention.is_currently_scheduled_online(at(10, 30)));

        // several windows passed unobserved
        assert!(retention.is_currently_scheduled_online(at(13, 5)));
        let window = retention.window(at(13, 5));
        assert_eq!(window.next_start, at(13, 0));
        assert_eq!(window.last_start, at(12, 0));
    }

    #[test]
    fn test_window_boundaries_are_exclusive() {
        let retention = ScheduledRetention::new("0 9 * * *", 60, false).unwrap();
        assert!(!retention.is_currently_scheduled_online(at(9, 0)));
        assert!(retention.is_currently_scheduled_online(at(9, 1)));
        assert!(!retention.is_currently_scheduled_online(at(10, 0)));
    }

    #[test]
    fn test_schedule_uses_offset() {
        let retention = ScheduledRetention::new("0 9 * * *", 60, false)
            .unwrap()
            .with_offset(FixedOffset::east_opt(3600).unwrap());
        // 09:00 at +01:00 is 08:00 UTC
        assert!(retention.is_currently_scheduled_online(at(8, 30)));
        assert!(!retention.is_currently_scheduled_online(at(9, 30)));
    }

    #[test]
    fn test_zero_up_time_is_one_minute() {
        let retention = ScheduledRetention::new("0 9 * * *", 0, false).unwrap();
        assert_eq!(retention.up_minutes(), 1);
    }

    #[test]
    fn test_bad_schedule_is_rejected() {
        let result = ScheduledRetention::new("61 * * * *", 10, false);
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_up_time_longer_than_a_week_is_rejected() {
        assert!(ScheduledRetention::new("0 9 * * *", MAX_UP_MINUTES, false).is_ok());
        let result = ScheduledRetention::new("0 9 * * *", u32::MAX, false);
        assert!(matches!(
            result,
            Err(SchedulerError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let offset = Utc.fix();
        let policy = RetentionPolicy::from_config(
            &RetentionConfig::Scheduled {
                schedule: "0 9 * * 1-5".to_string(),
                up_minutes: 30,
                keep_up_when_active: true,
            },
            offset,
            &no_demand(),
        )
        .unwrap();
        assert_eq!(policy.name(), "scheduled");
        assert!(policy.is_manual_launch_allowed(at(9, 10)));
        assert!(!policy.is_manual_launch_allowed(at(12, 0)));

        let manual =
            RetentionPolicy::from_config(&RetentionConfig::Manual, offset, &no_demand()).unwrap();
        assert!(manual.is_manual_launch_allowed(at(12, 0)));

        let demand = RetentionPolicy::from_config(
            &RetentionConfig::Demand {
                in_demand_minutes: 3,
                idle_minutes: 20,
            },
            offset,
            &no_demand(),
        )
        .unwrap();
        assert_eq!(demand.name(), "demand");
        let RetentionPolicy::Demand(demand) = demand else {
            panic!("expected a demand policy");
        };
        assert_eq!(demand.in_demand_delay(), TimeDelta::minutes(3));
        assert_eq!(demand.idle_delay(), TimeDelta::minutes(20));
    }

    #[tokio::test]
    async fn test_launches_offline_node_in_window() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);

        let check = daily_nine(false).check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Launch);
        check.launch.unwrap().await.unwrap();
        assert_eq!(node.connects(), 1);
        assert!(node.is_online());
    }

    #[tokio::test]
    async fn test_launch_reenables_accepting_when_keeping_up() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);
        node.set_accepting_tasks(false);

        let check = daily_nine(true).check(&as_computer(&node), at(10, 0));
        check.launch.unwrap().await.unwrap();
        assert!(node.is_accepting_tasks());
    }

    #[tokio::test]
    async fn test_failed_launch_is_retried_next_check() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);
        node.fail_connects();
        let policy = daily_nine(false);

        let check = policy.check(&as_computer(&node), at(10, 0));
        check.launch.unwrap().await.unwrap();
        assert!(node.is_offline());

        let check = policy.check(&as_computer(&node), at(10, 1));
        assert_eq!(check.action, RetentionAction::Launch);
        check.launch.unwrap().await.unwrap();
        assert_eq!(node.connects(), 2);
    }

    #[test]
    fn test_unlaunchable_node_is_left_alone() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);
        node.set_launch_supported(false);

        let check = daily_nine(false).check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Leave);
        assert_eq!(node.connects(), 0);
    }

    #[test]
    fn test_disconnects_after_window() {
        let node = FakeComputer::new("a", 1);
        node.set_idle(false);

        let check = daily_nine(false).check(&as_computer(&node), at(18, 0));
        assert_eq!(check.action, RetentionAction::Disconnect);
        assert_eq!(node.disconnects(), 1);
    }

    #[test]
    fn test_keep_up_when_active_drains_busy_node() {
        let node = FakeComputer::new("a", 1);
        node.set_idle(false);
        let policy = daily_nine(true);

        let check = policy.check(&as_computer(&node), at(18, 0));
        assert_eq!(check.action, RetentionAction::StopAccepting);
        assert!(node.is_online());
        assert!(!node.is_accepting_tasks());

        // still busy: nothing more to do
        let check = policy.check(&as_computer(&node), at(18, 1));
        assert_eq!(check.action, RetentionAction::Leave);

        node.set_idle(true);
        let check = policy.check(&as_computer(&node), at(18, 2));
        assert_eq!(check.action, RetentionAction::Disconnect);
        assert_eq!(node.disconnects(), 1);
    }

    #[test]
    fn test_keep_up_when_active_disconnects_idle_node() {
        let node = FakeComputer::new("a", 1);
        let check = daily_nine(true).check(&as_computer(&node), at(18, 0));
        assert_eq!(check.action, RetentionAction::Disconnect);
    }

    #[test]
    fn test_online_node_in_window_is_left_alone() {
        let node = FakeComputer::new("a", 1);
        let check = daily_nine(false).check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Leave);
        assert_eq!(node.disconnects(), 0);
    }

    #[test]
    fn test_manual_never_acts() {
        let node = FakeComputer::new("a", 1);
        node.set_online(false);
        let check = RetentionPolicy::Manual.check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Leave);
        assert_eq!(node.connects(), 0);
    }

    #[tokio::test]
    async fn test_always_relaunches_offline_node() {
        let node = FakeComputer::new("a", 1);
        let policy = RetentionPolicy::Always;
        assert_eq!(
            policy.check(&as_computer(&node), at(3, 0)).action,
            RetentionAction::Leave
        );

        node.set_online(false);
        let check = policy.check(&as_computer(&node), at(3, 0));
        assert_eq!(check.action, RetentionAction::Launch);
        check.launch.unwrap().await.unwrap();
        assert!(node.is_online());
    }

    #[tokio::test]
    async fn test_demand_launches_after_work_waits() {
        let node = FakeComputer::with_labels("a", 1, &["linux"]);
        node.set_online(false);
        let queue = Arc::new(WaitingQueue::new());
        let policy = on_demand(&queue);

        // nothing waiting
        let check = policy.check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Leave);

        let task = Task::new("t").with_subtask(SubTask::new("main"));
        queue.enqueue(Arc::new(task), at(10, 0));
        let check = policy.check(&as_computer(&node), at(10, 5));
        assert_eq!(check.action, RetentionAction::Leave);

        let check = policy.check(&as_computer(&node), at(10, 6));
        assert_eq!(check.action, RetentionAction::Launch);
        check.launch.unwrap().await.unwrap();
        assert!(node.is_online());
        assert_eq!(node.connects(), 1);
    }

    #[test]
    fn test_demand_ignores_work_for_other_nodes() {
        let node = FakeComputer::with_labels("a", 1, &["linux"]);
        node.set_online(false);
        let queue = Arc::new(WaitingQueue::new());
        let task = Task::new("t")
            .with_subtask(SubTask::new("main").with_label(foreman_core::Label::atom("mac")));
        queue.enqueue(Arc::new(task), at(9, 0));

        let check = on_demand(&queue).check(&as_computer(&node), at(10, 0));
        assert_eq!(check.action, RetentionAction::Leave);
        assert_eq!(node.connects(), 0);
    }

    #[test]
    fn test_demand_disconnects_after_idle_delay() {
        let node = FakeComputer::new("a", 1);
        let queue = Arc::new(WaitingQueue::new());
        let policy = on_demand(&queue);

        assert_eq!(
            policy.check(&as_computer(&node), at(10, 0)).action,
            RetentionAction::Leave
        );
        assert_eq!(
            policy.check(&as_computer(&node), at(10, 10)).action,
            RetentionAction::Leave
        );

        // work in between restarts the idle stretch
        node.set_idle(false);
        policy.check(&as_computer(&node), at(10, 11));
        node.set_idle(true);
        assert_eq!(
            policy.check(&as_computer(&node), at(10, 12)).action,
            RetentionAction::Leave
        );
        assert_eq!(
            policy.check(&as_computer(&node), at(10, 22)).action,
            RetentionAction::Leave
        );
        assert_eq!(node.disconnects(), 0);

        let check = policy.check(&as_computer(&node), at(10, 23));
        assert_eq!(check.action, RetentionAction::Disconnect);
        assert_eq!(node.disconnects(), 1);
        assert!(node.is_offline());
    }
}
