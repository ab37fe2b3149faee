//! Schedule validation.

use anyhow::{Context, Result};
use chrono::{DurationRound, TimeDelta, Utc};
use foreman_config::CronTabList;

use super::utc_offset;

/// Give up looking for matches after a year of minutes.
const SEARCH_LIMIT_MINUTES: i64 = 366 * 24 * 60;

pub fn check(spec: &str, next: usize, utc_offset_minutes: i32) -> Result<()> {
    let tabs = CronTabList::parse(spec).context("Invalid schedule")?;
    let offset = utc_offset(utc_offset_minutes)?;

    println!("Schedule is valid");
    if let Some(warning) = tabs.check_sanity() {
        println!("warning: {warning}");
    }

    let now = Utc::now();
    let mut minute = now.duration_trunc(TimeDelta::minutes(1))? + TimeDelta::minutes(1);
    let mut found = 0;
    for _ in 0..SEARCH_LIMIT_MINUTES {
        if found == next {
            break;
        }
        let local = minute.with_timezone(&offset);
        if tabs.check(&local) {
            println!("  {}", local.to_rfc3339());
            found += 1;
        }
        minute += TimeDelta::minutes(1);
    }
    if found < next {
        println!("  (no further matches within a year)");
    }
    Ok(())
}
