use std::collections::BTreeMap;

use anyhow::Result;
use geom::Distance;
use serde::Deserialize;

use crate::StopID;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule has no stops")]
    Empty,

    #[error("{0} appears twice in the schedule")]
    DuplicateStop(StopID),

    #[error("{stop} is {distance} along the route, but the stop before it is at {previous}")]
    DistanceOutOfOrder {
        stop: StopID,
        distance: Distance,
        previous: Distance,
    },

    #[error("{0} isn't on this schedule")]
    UnknownStop(StopID),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledStop {
    pub id: StopID,
    /// Cumulative distance from the start of the route
    pub distance: Distance,
}

/// The stops of one route in one direction, in the order a bus visits them.
///
/// Distances never decrease along the schedule and no stop appears twice. Both are checked on
/// construction, so everything downstream can index by position.
#[derive(Clone, Debug)]
pub struct StopSchedule {
    stops: Vec<ScheduledStop>,
    positions: BTreeMap<StopID, usize>,
}

impl StopSchedule {
    pub fn new(stops: Vec<ScheduledStop>) -> Result<Self, ScheduleError> {
        if stops.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let mut positions = BTreeMap::new();
        for (idx, stop) in stops.iter().enumerate() {
            if idx > 0 && stop.distance < stops[idx - 1].distance {
                return Err(ScheduleError::DistanceOutOfOrder {
                    stop: stop.id.clone(),
                    distance: stop.distance,
                    previous: stops[idx - 1].distance,
                });
            }
            if positions.insert(stop.id.clone(), idx).is_some() {
                return Err(ScheduleError::DuplicateStop(stop.id.clone()));
            }
        }
        Ok(Self { stops, positions })
    }

    pub fn stops(&self) -> &[ScheduledStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// One less than the number of stops; zero for a single-stop schedule.
    pub fn segment_count(&self) -> usize {
        self.stops.len() - 1
    }

    pub fn position(&self, stop: &StopID) -> Option<usize> {
        self.positions.get(stop).copied()
    }

    pub fn contains(&self, stop: &StopID) -> bool {
        self.positions.contains_key(stop)
    }

    pub fn stop(&self, idx: usize) -> &ScheduledStop {
        &self.stops[idx]
    }

    pub fn distance_of(&self, stop: &StopID) -> Option<Distance> {
        self.position(stop).map(|idx| self.stops[idx].distance)
    }

    pub fn origin(&self) -> &ScheduledStop {
        &self.stops[0]
    }

    pub fn terminus(&self) -> &ScheduledStop {
        &self.stops[self.stops.len() - 1]
    }

    /// The part of the schedule from `first` through `last`, both inclusive.
    pub fn slice(&self, first: &StopID, last: &StopID) -> Result<Self, ScheduleError> {
        let start = self
            .position(first)
            .ok_or_else(|| ScheduleError::UnknownStop(first.clone()))?;
        let end = self
            .position(last)
            .ok_or_else(|| ScheduleError::UnknownStop(last.clone()))?;
        if start > end {
            return Err(ScheduleError::Empty);
        }
        Self::new(self.stops[start..=end].to_vec())
    }

    /// Reads `stop_id,distance_along_route` rows, with distances in meters.
    pub fn load<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut stops = Vec::new();
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: Record = rec?;
            if !rec.distance_along_route.is_finite() || rec.distance_along_route < 0.0 {
                bail!(
                    "{} has a bad distance along the route: {}",
                    rec.stop_id,
                    rec.distance_along_route
                );
            }
            stops.push(ScheduledStop {
                id: rec.stop_id,
                distance: Distance::meters(rec.distance_along_route),
            });
        }
        let schedule = Self::new(stops)?;
        debug!(
            "Loaded a schedule of {} stops, {} long",
            schedule.len(),
            schedule.terminus().distance
        );
        Ok(schedule)
    }
}

#[derive(Deserialize)]
struct Record {
    stop_id: StopID,
    distance_along_route: f64,
}
