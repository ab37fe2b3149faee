//! System configuration parsing.
//!
//! ```kdl
//! scheduler {
//!     forecast-horizon-minutes 15
//!     check-interval-seconds 60
//!     utc-offset-minutes 60
//! }
//!
//! node "linux-1" executors=2 {
//!     labels "linux" "x86_64"
//!     retention "scheduled" schedule="0 9 * * 1-5" up-minutes=480 keep-up-when-active=#true
//! }
//!
//! reservation node="linux-1" start-in-minutes=0 minutes=10 executors=1
//! ```

use chrono::{FixedOffset, Offset, Utc};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::crontab::CronTabList;
use crate::kdl_util::{
    child_u32, get_all_string_args, get_bool_prop, get_first_integer_arg, get_first_string_arg,
    get_string_prop, get_u32_prop,
};
use crate::{ConfigError, ConfigResult};

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub scheduler: SchedulerSettings,
    pub nodes: Vec<NodeConfig>,
    pub reservations: Vec<ReservationConfig>,
}

/// Tuning for scheduling passes and retention checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Upper bound on how far ahead load forecasts are consulted.
    pub forecast_horizon: Duration,
    /// Period of the retention checker.
    pub check_interval: Duration,
    /// Offset applied to UTC before matching retention schedules.
    pub utc_offset_minutes: i32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            forecast_horizon: Duration::from_secs(15 * 60),
            check_interval: Duration::from_secs(60),
            utc_offset_minutes: 0,
        }
    }
}

impl SchedulerSettings {
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub executors: usize,
    pub labels: Vec<String>,
    pub launch_supported: bool,
    /// Initial connectivity for nodes that are simulated rather than launched.
    pub online: bool,
    pub retention: RetentionConfig,
}

/// How a node's connectivity is managed over time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionConfig {
    /// Keep the node online whenever it can be launched.
    #[default]
    Always,
    /// Never touch the node's connectivity.
    Manual,
    /// Bring the node online on a recurring schedule.
    Scheduled {
        schedule: String,
        up_minutes: u32,
        keep_up_when_active: bool,
    },
    /// Bring the node online when work has waited for it, take it offline
    /// when it has been idle.
    Demand {
        in_demand_minutes: u32,
        idle_minutes: u32,
    },
}

/// Longest accepted `up-minutes`: one week.
pub const MAX_UP_MINUTES: u32 = 7 * 24 * 60;

/// Executors a node has promised to something outside the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConfig {
    pub node: String,
    pub start_in_minutes: u32,
    pub minutes: u32,
    pub executors: u32,
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = SystemConfig::default();
    let mut names = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "scheduler" => {
                config.scheduler = parse_scheduler(node)?;
            }
            "node" => {
                let parsed = parse_node(node)?;
                if !names.insert(parsed.name.clone()) {
                    return Err(ConfigError::Duplicate(format!("node '{}'", parsed.name)));
                }
                config.nodes.push(parsed);
            }
            "reservation" => {
                config.reservations.push(parse_reservation(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    for reservation in &config.reservations {
        if !names.contains(&reservation.node) {
            return Err(ConfigError::InvalidValue {
                field: "reservation node".to_string(),
                message: format!("unknown node '{}'", reservation.node),
            });
        }
    }

    Ok(config)
}

fn parse_scheduler(node: &KdlNode) -> ConfigResult<SchedulerSettings> {
    let mut settings = SchedulerSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "forecast-horizon-minutes" => {
                    let minutes = child_u32(child, "forecast-horizon-minutes")?;
                    settings.forecast_horizon = Duration::from_secs(u64::from(minutes) * 60);
                }
                "check-interval-seconds" => {
                    let seconds = child_u32(child, "check-interval-seconds")?;
                    if seconds == 0 {
                        return Err(ConfigError::InvalidValue {
                            field: "check-interval-seconds".to_string(),
                            message: "must be positive".to_string(),
                        });
                    }
                    settings.check_interval = Duration::from_secs(u64::from(seconds));
                }
                "utc-offset-minutes" => {
                    settings.utc_offset_minutes = get_first_integer_arg(child)
                        .and_then(|n| i32::try_from(n).ok())
                        .filter(|n| n.abs() < 24 * 60)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: "utc-offset-minutes".to_string(),
                            message: "expected minutes strictly between -1440 and 1440"
                                .to_string(),
                        })?;
                }
                _ => {}
            }
        }
    }

    Ok(settings)
}

fn parse_node(node: &KdlNode) -> ConfigResult<NodeConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("node name".to_string()))?;

    let executors = get_u32_prop(node, "executors")?.unwrap_or(1) as usize;
    if executors == 0 {
        return Err(ConfigError::InvalidValue {
            field: format!("executors of node '{name}'"),
            message: "a node needs at least one executor".to_string(),
        });
    }

    let mut labels = Vec::new();
    let mut retention = RetentionConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "labels" => {
                    labels.extend(get_all_string_args(child));
                }
                "retention" => {
                    retention = parse_retention(child, &name)?;
                }
                _ => {}
            }
        }
    }

    Ok(NodeConfig {
        name,
        executors,
        labels,
        launch_supported: get_bool_prop(node, "launch-supported").unwrap_or(true),
        online: get_bool_prop(node, "online").unwrap_or(true),
        retention,
    })
}

fn parse_retention(node: &KdlNode, node_name: &str) -> ConfigResult<RetentionConfig> {
    let kind = get_first_string_arg(node).unwrap_or_default();

    match kind.as_str() {
        "always" | "" => Ok(RetentionConfig::Always),
        "manual" => Ok(RetentionConfig::Manual),
        "scheduled" => {
            let schedule = get_string_prop(node, "schedule").ok_or_else(|| {
                ConfigError::MissingField(format!("schedule for node '{node_name}'"))
            })?;
            // validate now so a bad schedule fails config loading
            CronTabList::parse(&schedule)?;

            let up_minutes = get_u32_prop(node, "up-minutes")?.ok_or_else(|| {
                ConfigError::MissingField(format!("up-minutes for node '{node_name}'"))
            })?;
            if up_minutes > MAX_UP_MINUTES {
                return Err(ConfigError::InvalidValue {
                    field: format!("up-minutes of node '{node_name}'"),
                    message: format!("at most {MAX_UP_MINUTES} minutes, got {up_minutes}"),
                });
            }

            Ok(RetentionConfig::Scheduled {
                schedule,
                up_minutes,
                keep_up_when_active: get_bool_prop(node, "keep-up-when-active").unwrap_or(false),
            })
        }
        "demand" => Ok(RetentionConfig::Demand {
            in_demand_minutes: get_u32_prop(node, "in-demand-minutes")?.unwrap_or(0),
            idle_minutes: get_u32_prop(node, "idle-minutes")?.unwrap_or(0),
        }),
        _ => Err(ConfigError::InvalidValue {
            field: "retention type".to_string(),
            message: format!("unknown retention type: {}", kind),
        }),
    }
}

fn parse_reservation(node: &KdlNode) -> ConfigResult<ReservationConfig> {
    let node_name = get_string_prop(node, "node")
        .ok_or_else(|| ConfigError::MissingField("reservation node".to_string()))?;
    let minutes = get_u32_prop(node, "minutes")?
        .ok_or_else(|| ConfigError::MissingField("reservation minutes".to_string()))?;

    Ok(ReservationConfig {
        node: node_name,
        start_in_minutes: get_u32_prop(node, "start-in-minutes")?.unwrap_or(0),
        minutes,
        executors: get_u32_prop(node, "executors")?.unwrap_or(1),
    })
}
