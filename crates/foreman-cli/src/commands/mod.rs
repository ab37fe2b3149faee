//! CLI command implementations.

pub mod cron;
pub mod plan;
pub mod pool;
pub mod retention;
pub mod window;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use foreman_config::{SystemConfig, parse_system_config};
use std::path::Path;

/// Reads the configuration file, returning its text and the parsed system config.
pub fn load_config(path: &Path) -> Result<(String, SystemConfig)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let system = parse_system_config(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok((content, system))
}

pub fn utc_offset(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("UTC offset out of range: {minutes} minutes"))
}
