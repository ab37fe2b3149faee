//! Peak concurrent demand over a set of intervals.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Accumulates `[start, end)` demand intervals and reports the peak number of
/// executors demanded at any instant.
///
/// Intervals may be inserted in any order.
#[derive(Debug, Default, Clone)]
pub struct Timeline {
    /// Break points: demand changes by the value at each instant.
    deltas: BTreeMap<DateTime<Utc>, i64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `demand` over `[start, end)` and returns the peak over everything
    /// inserted so far. Empty intervals change nothing.
    pub fn insert(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, demand: u32) -> u32 {
        if end > start && demand > 0 {
            let demand = i64::from(demand);
            *self.deltas.entry(start).or_default() += demand;
            *self.deltas.entry(end).or_default() -= demand;
            self.deltas.retain(|_, delta| *delta != 0);
        }
        self.peak()
    }

    pub fn peak(&self) -> u32 {
        let mut running = 0i64;
        let mut peak = 0i64;
        for delta in self.deltas.values() {
            running += delta;
            peak = peak.max(running);
        }
        u32::try_from(peak).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
