use std::collections::VecDeque;

use chrono::NaiveDateTime;
use geom::{Distance, Duration, Speed};

/// Assumed before there are two observations to compare. About 8mph.
const DEFAULT_SPEED_MPS: f64 = 4.0;
/// Reported when the bus hasn't moved at all
const STALLED_SECONDS_AWAY: f64 = 6000.0;
/// Observations this many steps back get the most weight
const CENTROID: f64 = 3.0;

/// Every raw observation of a bus, underway or not, as (time, distance to the monitored stop).
/// Most recent first, without repeated times.
///
/// This predates the arrival-time model and only provides a rough fallback estimate.
#[derive(Clone, Debug)]
pub struct PositionHistory {
    pairs: VecDeque<(NaiveDateTime, Distance)>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            pairs: VecDeque::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn observe(&mut self, time: NaiveDateTime, distance_to_end: Distance) {
        if self.pairs.front().map(|(t, _)| *t == time).unwrap_or(false) {
            return;
        }
        self.pairs.push_front((time, distance_to_end));
        self.pairs.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn distance_away(&self) -> Option<Distance> {
        self.pairs.front().map(|(_, dist)| *dist)
    }

    /// A rolling average of the speed from each older observation to the newest one, weighted
    /// towards observations a few steps back.
    pub fn speed(&self) -> Speed {
        if self.pairs.len() < 2 {
            return Speed::meters_per_second(DEFAULT_SPEED_MPS);
        }

        let mut speed_sum = 0.0;
        let mut weight_sum = 0.0;
        for i in 1..self.pairs.len() {
            let offset = (i as f64 - CENTROID).abs();
            let weight = CENTROID / if offset > 0.0 { offset } else { 0.5 };
            weight_sum += weight;
            speed_sum += self.naive_speed(0, i) * weight;
        }
        Speed::meters_per_second(speed_sum / weight_sum)
    }

    pub fn time_away(&self) -> Duration {
        let meters_per_second = self.speed().inner_meters_per_second();
        if meters_per_second == 0.0 {
            return Duration::seconds(STALLED_SECONDS_AWAY);
        }
        let meters = self
            .distance_away()
            .map(|d| d.inner_meters())
            .unwrap_or(0.0);
        Duration::seconds(meters / meters_per_second)
    }

    // In meters per second. An out-of-range end means the oldest observation.
    fn naive_speed(&self, start: usize, end: usize) -> f64 {
        let end = end.min(self.pairs.len() - 1);
        let (t1, d1) = self.pairs[start];
        let (t2, d2) = self.pairs[end];
        let seconds = (t1 - t2).num_seconds().abs();
        if seconds == 0 {
            return 0.0;
        }
        (d1.inner_meters() - d2.inner_meters()).abs() / seconds as f64
    }
}
