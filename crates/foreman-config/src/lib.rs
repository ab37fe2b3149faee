//! KDL configuration and schedule parsing for the Foreman CI scheduler.
//!
//! This crate handles parsing of:
//! - Recurring time specifications (cron syntax)
//! - System configuration: nodes, retention rules, scheduler settings
//! - Task definitions

pub mod crontab;
pub mod error;
mod kdl_util;
pub mod system;
pub mod tasks;

pub use crontab::{CronTab, CronTabList};
pub use error::{ConfigError, ConfigResult};
pub use system::{
    MAX_UP_MINUTES, NodeConfig, ReservationConfig, RetentionConfig, SchedulerSettings, SystemConfig,
    parse_system_config,
};
pub use tasks::parse_tasks;
