//! Recurring time specifications in cron syntax.
//!
//! Each line holds five fields: minute, hour, day of month, month and day of
//! week. A field is a comma separated list of `*`, `N`, `N-M`, each optionally
//! followed by `/STEP`. Months and days of week also accept three letter names
//! (`JAN`, `MON`). Day of week 7 is Sunday, like 0.
//!
//! The aliases `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//! `@midnight` and `@hourly` stand for their usual expansions.
//!
//! Day of month and day of week must both match for a minute to fire.

use chrono::{Datelike, Timelike};

use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

const FIELDS: [Field; 5] = [
    Field::Minute,
    Field::Hour,
    Field::DayOfMonth,
    Field::Month,
    Field::DayOfWeek,
];

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl Field {
    /// Inclusive bounds accepted in the spec text.
    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 7),
        }
    }

    /// Bounds after normalization (day of week 7 folds onto 0).
    fn effective_bounds(self) -> (u32, u32) {
        match self {
            Field::DayOfWeek => (0, 6),
            other => other.bounds(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day of month",
            Field::Month => "month",
            Field::DayOfWeek => "day of week",
        }
    }

    fn value(self, token: &str) -> Option<u32> {
        if let Ok(n) = token.parse::<u32>() {
            return Some(n);
        }
        let upper = token.to_ascii_uppercase();
        match self {
            Field::Month => MONTH_NAMES
                .iter()
                .position(|n| *n == upper)
                .map(|i| i as u32 + 1),
            Field::DayOfWeek => DAY_NAMES.iter().position(|n| *n == upper).map(|i| i as u32),
            _ => None,
        }
    }
}

/// One line of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTab {
    spec: String,
    bits: [u64; 5],
}

impl CronTab {
    pub fn parse(line: &str) -> ConfigResult<Self> {
        let spec = line.trim().to_string();
        let expanded = match spec.as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(invalid(&spec, format!("unknown alias '{other}'")));
            }
            other => other,
        };

        let parts: Vec<&str> = expanded.split_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(invalid(
                &spec,
                format!("expected 5 fields, found {}", parts.len()),
            ));
        }

        let mut bits = [0u64; 5];
        for (i, (field, text)) in FIELDS.iter().zip(parts).enumerate() {
            bits[i] = parse_field(*field, text).map_err(|message| invalid(&spec, message))?;
        }

        Ok(Self { spec, bits })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Does the minute containing `time` match this line?
    pub fn check<T: Datelike + Timelike>(&self, time: &T) -> bool {
        let values = [
            time.minute(),
            time.hour(),
            time.day(),
            time.month(),
            time.weekday().num_days_from_sunday(),
        ];
        values
            .iter()
            .zip(self.bits.iter())
            .all(|(value, bits)| bits & (1u64 << value) != 0)
    }

    /// Warns about specs that are valid but probably not what was meant.
    ///
    /// A restricted field above an unrestricted minute field fires every
    /// minute within the restriction, e.g. `* 9 * * *` runs sixty times.
    pub fn check_sanity(&self) -> Option<String> {
        for (i, field) in FIELDS.iter().enumerate() {
            let (lo, hi) = field.effective_bounds();
            let full = (lo..=hi).all(|v| self.bits[i] & (1u64 << v) != 0);
            if !full {
                if i == 0 {
                    return None;
                }
                let rest = self
                    .spec
                    .split_once(char::is_whitespace)
                    .map(|(_, rest)| rest.trim_start())
                    .unwrap_or_default();
                return Some(format!(
                    "Do you really mean \"every minute\" when you say \"{}\"? Perhaps you meant \"0 {}\"",
                    self.spec, rest
                ));
            }
        }
        None
    }
}

fn invalid(spec: &str, message: String) -> ConfigError {
    ConfigError::InvalidSchedule {
        spec: spec.to_string(),
        message,
    }
}

fn parse_field(field: Field, text: &str) -> Result<u64, String> {
    let (lo, hi) = field.bounds();
    let mut bits = 0u64;

    for term in text.split(',') {
        let (range, step) = match term.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in {} field", field.name()))?;
                if step == 0 {
                    return Err(format!("step must be positive in {} field", field.name()));
                }
                (range, Some(step))
            }
            None => (term, None),
        };

        let value = |token: &str| {
            field
                .value(token)
                .ok_or_else(|| format!("invalid {} '{token}'", field.name()))
        };

        let (start, end) = if range == "*" {
            (lo, hi)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(a)?, value(b)?)
        } else {
            let v = value(range)?;
            // "N/STEP" runs from N to the end of the field
            if step.is_some() { (v, hi) } else { (v, v) }
        };

        if start < lo || end > hi {
            return Err(format!(
                "{} out of range {lo}-{hi} in '{term}'",
                field.name()
            ));
        }
        if start > end {
            return Err(format!("empty range '{term}' in {} field", field.name()));
        }

        let step = step.unwrap_or(1);
        if step > hi - lo + 1 {
            return Err(format!(
                "step {step} exceeds the {} field's range {lo}-{hi}",
                field.name()
            ));
        }

        let mut v = Some(start);
        while let Some(n) = v.filter(|n| *n <= end) {
            let normalized = if field == Field::DayOfWeek && n == 7 { 0 } else { n };
            bits |= 1u64 << normalized;
            v = n.checked_add(step);
        }
    }

    Ok(bits)
}

/// A multi-line schedule. A minute matches when any line matches.
///
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTabList {
    tabs: Vec<CronTab>,
}

impl CronTabList {
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let tabs = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(CronTab::parse)
            .collect::<ConfigResult<Vec<_>>>()?;

        if tabs.is_empty() {
            return Err(invalid(text.trim(), "no schedule entries".to_string()));
        }
        Ok(Self { tabs })
    }

    pub fn check<T: Datelike + Timelike>(&self, time: &T) -> bool {
        self.tabs.iter().any(|tab| tab.check(time))
    }

    pub fn check_sanity(&self) -> Option<String> {
        self.tabs.iter().find_map(CronTab::check_sanity)
    }

    pub fn tabs(&self) -> &[CronTab] {
        &self.tabs
    }
}
