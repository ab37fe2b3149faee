//! Availability window inspection.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use foreman_scheduler::{AvailabilityWindow, ScheduledRetention};
use serde::Serialize;

use super::utc_offset;

#[derive(Serialize)]
struct WindowReport {
    at: DateTime<Utc>,
    online: bool,
    window: AvailabilityWindow,
}

pub fn show(
    spec: &str,
    up_minutes: u32,
    at: Option<&str>,
    utc_offset_minutes: i32,
    json: bool,
) -> Result<()> {
    let now = match at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid time: {text}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let retention = ScheduledRetention::new(spec, up_minutes, false)
        .context("Invalid schedule")?
        .with_offset(utc_offset(utc_offset_minutes)?);
    let report = WindowReport {
        at: now,
        online: retention.is_currently_scheduled_online(now),
        window: retention.window(now),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("At:        {}", report.at.to_rfc3339());
    println!(
        "Last:      {} .. {}",
        report.window.last_start.to_rfc3339(),
        report.window.last_stop.to_rfc3339()
    );
    println!(
        "Next:      {} .. {}",
        report.window.next_start.to_rfc3339(),
        report.window.next_stop.to_rfc3339()
    );
    println!("Online:    {}", if report.online { "yes" } else { "no" });
    Ok(())
}
