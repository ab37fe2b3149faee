//! Load forecasting.
//!
//! Predictors report demand that will hit a node soon but is not in the queue
//! yet. A scheduling pass holds that many idle executors back so a long task
//! does not take a slot somebody has already been promised.

use chrono::{DateTime, TimeDelta, Utc};
use foreman_config::ReservationConfig;
use foreman_core::{Computer, NodeId};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::SchedulerResult;
use crate::timeline::Timeline;

/// At most this many loads are taken from a single predictor per node and pass.
pub const MAX_LOADS_PER_PREDICTOR: usize = 100;

/// Predicted demand on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureLoad {
    pub start_time: DateTime<Utc>,
    pub duration: TimeDelta,
    /// Executors the load will occupy.
    pub num_executors: u32,
}

impl FutureLoad {
    pub fn new(start_time: DateTime<Utc>, duration: TimeDelta, num_executors: u32) -> Self {
        Self {
            start_time,
            duration,
            num_executors,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }
}

/// Source of forecast demand.
///
/// Predictors are best effort: an error drops that predictor from the current
/// pass and nothing else.
pub trait LoadPredictor: Send + Sync {
    fn name(&self) -> &str;

    /// Loads on `computer` overlapping `[start, end)`.
    fn predict(
        &self,
        computer: &dyn Computer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Vec<FutureLoad>>;
}

/// Peak forecast demand on `computer` over `[now, now + horizon)`.
///
/// Stops consulting predictors once the peak reaches the node's executor count.
pub fn forecast_peak(
    predictors: &[Arc<dyn LoadPredictor>],
    computer: &dyn Computer,
    now: DateTime<Utc>,
    horizon: TimeDelta,
) -> u32 {
    let end = now + horizon;
    let max = u32::try_from(computer.count_executors()).unwrap_or(u32::MAX);
    let mut timeline = Timeline::new();
    let mut peak = 0;

    for predictor in predictors {
        let loads = match predictor.predict(computer, now, end) {
            Ok(loads) => loads,
            Err(e) => {
                warn!(
                    predictor = predictor.name(),
                    node = %computer.id(),
                    error = %e,
                    "Load predictor failed, ignoring it for this pass"
                );
                continue;
            }
        };

        for load in loads.into_iter().take(MAX_LOADS_PER_PREDICTOR) {
            let start = load.start_time.max(now);
            let stop = load.end_time().min(end);
            peak = peak.max(timeline.insert(start, stop, load.num_executors));
            if peak >= max {
                debug!(node = %computer.id(), peak, "Forecast saturates node");
                return peak;
            }
        }
    }

    peak
}

#[derive(Debug, Clone)]
struct Reservation {
    node: NodeId,
    load: FutureLoad,
}

/// Predicts load from explicit reservations made ahead of time.
#[derive(Debug, Default)]
pub struct ReservationPredictor {
    reservations: RwLock<Vec<Reservation>>,
}

impl ReservationPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds reservations relative to `now` from configuration.
    pub fn from_config(reservations: &[ReservationConfig], now: DateTime<Utc>) -> Self {
        let predictor = Self::new();
        for r in reservations {
            predictor.reserve(
                NodeId::new(r.node.clone()),
                FutureLoad::new(
                    now + TimeDelta::minutes(i64::from(r.start_in_minutes)),
                    TimeDelta::minutes(i64::from(r.minutes)),
                    r.executors,
                ),
            );
        }
        predictor
    }

    pub fn reserve(&self, node: NodeId, load: FutureLoad) {
        self.reservations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Reservation { node, load });
    }

    /// Drops reservations that ended before `now`.
    pub fn expire(&self, now: DateTime<Utc>) {
        self.reservations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| r.load.end_time() > now);
    }

    pub fn len(&self) -> usize {
        self.reservations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LoadPredictor for ReservationPredictor {
    fn name(&self) -> &str {
        "reservations"
    }

    fn predict(
        &self,
        computer: &dyn Computer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Vec<FutureLoad>> {
        let reservations = self
            .reservations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(reservations
            .iter()
            .filter(|r| &r.node == computer.id())
            .filter(|r| r.load.start_time < end && r.load.end_time() > start)
            .map(|r| r.load.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use crate::testing::{FakeComputer, at};

    struct FailingPredictor;

    impl LoadPredictor for FailingPredictor {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(
            &self,
            _computer: &dyn Computer,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> SchedulerResult<Vec<FutureLoad>> {
            Err(SchedulerError::Forecast("backend unavailable".to_string()))
        }
    }

    #[test]
    fn test_peak_from_reservations() {
        let now = at(10, 0);
        let node = FakeComputer::new("a", 4);
        let reservations = ReservationPredictor::new();
        reservations.reserve(NodeId::new("a"), FutureLoad::new(now, TimeDelta::minutes(10), 3));
        // another node's reservation does not count
        reservations.reserve(NodeId::new("b"), FutureLoad::new(now, TimeDelta::minutes(10), 4));

        let predictors: Vec<Arc<dyn LoadPredictor>> = vec![Arc::new(reservations)];
        assert_eq!(
            forecast_peak(&predictors, node.as_ref(), now, TimeDelta::minutes(10)),
            3
        );
    }

    #[test]
    fn test_load_outside_horizon_is_ignored() {
        let now = at(10, 0);
        let node = FakeComputer::new("a", 4);
        let reservations = ReservationPredictor::new();
        reservations.reserve(
            NodeId::new("a"),
            FutureLoad::new(at(10, 20), TimeDelta::minutes(10), 3),
        );

        let predictors: Vec<Arc<dyn LoadPredictor>> = vec![Arc::new(reservations)];
        assert_eq!(
            forecast_peak(&predictors, node.as_ref(), now, TimeDelta::minutes(15)),
            0
        );
    }

    #[test]
    fn test_failing_predictor_is_skipped() {
        let now = at(10, 0);
        let node = FakeComputer::new("a", 4);
        let reservations = ReservationPredictor::new();
        reservations.reserve(NodeId::new("a"), FutureLoad::new(now, TimeDelta::minutes(5), 2));

        let predictors: Vec<Arc<dyn LoadPredictor>> =
            vec![Arc::new(FailingPredictor), Arc::new(reservations)];
        assert_eq!(
            forecast_peak(&predictors, node.as_ref(), now, TimeDelta::minutes(10)),
            2
        );
    }

    #[test]
    fn test_from_config_and_expire() {
        let now = at(10, 0);
        let predictor = ReservationPredictor::from_config(
            &[
                ReservationConfig {
                    node: "a".to_string(),
                    start_in_minutes: 0,
                    minutes: 5,
                    executors: 1,
                },
                ReservationConfig {
                    node: "a".to_string(),
                    start_in_minutes: 30,
                    minutes: 5,
                    executors: 1,
                },
            ],
            now,
        );
        assert_eq!(predictor.len(), 2);
        predictor.expire(at(10, 10));
        assert_eq!(predictor.len(), 1);
    }
}
