use std::collections::VecDeque;
use std::fmt;

use chrono::NaiveDateTime;
use geom::{Distance, Duration};

use route::{BusNumber, RouteName, Snapshot, StopID, StopSchedule};

use crate::segment::segment_intervals;
use crate::{
    CompletedTrajectory, Estimate, HistoricalTrajectory, IntegrityError, PositionHistory, Signal,
    SignalThresholds, SignalTimes, SimilaritySearch, StopArrivals, TrackingConfig,
};

/// One bus heading towards the monitored stop. Turns its noisy snapshots into arrival times at
/// every stop along the way, including the ones no snapshot caught it at.
pub struct Bus {
    pub number: BusNumber,
    pub route: RouteName,
    pub destination: StopID,
    /// From the first stop the bus was seen heading to, through the destination
    schedule: StopSchedule,
    arrivals: StopArrivals,
    /// Snapshots while underway, most recent first
    underway: VecDeque<Snapshot>,
    max_positions: usize,
    positions: PositionHistory,
    /// Set once the bus starts moving along the route
    start_time: Option<NaiveDateTime>,
    /// Only true if the bus was first seen at the start of the route. Otherwise the trajectory is
    /// missing its beginning and must never become history.
    has_full_data: bool,
    /// Was underway, then headed to a stop past the end of its schedule
    left_route: bool,

    estimate: Option<Estimate>,
    /// When the first estimate said the bus would reach the destination
    first_projected_arrival: Option<NaiveDateTime>,
    signal: Option<Signal>,
    signal_times: SignalTimes,
}

impl Bus {
    pub fn new(
        number: BusNumber,
        route: RouteName,
        destination: StopID,
        route_schedule: &StopSchedule,
        first_seen: &Snapshot,
        config: &TrackingConfig,
    ) -> Result<Self, IntegrityError> {
        // A bus not yet heading to any stop on the route is on its way to the start
        let first_stop = if route_schedule.contains(&first_seen.next_stop) {
            first_seen.next_stop.clone()
        } else {
            route_schedule.origin().id.clone()
        };
        let schedule = route_schedule.slice(&first_stop, &destination)?;

        let from_origin = schedule.origin().distance.inner_meters()
            - route_schedule.origin().distance.inner_meters();
        let has_full_data = from_origin < config.max_gps_error().inner_meters();
        if !has_full_data {
            debug!(
                "{} added mid-route, {} along",
                number,
                schedule.origin().distance
            );
        }

        Ok(Self {
            number,
            route,
            destination,
            arrivals: StopArrivals::new(schedule.len()),
            schedule,
            underway: VecDeque::new(),
            max_positions: config.max_positions,
            positions: PositionHistory::new(config.max_positions),
            start_time: None,
            has_full_data,
            left_route: false,

            estimate: None,
            first_projected_arrival: None,
            signal: None,
            signal_times: SignalTimes::default(),
        })
    }

    /// Update the bus's arrival times from one new snapshot. On error, no arrival time changes.
    pub fn ingest(&mut self, snapshot: Snapshot) -> Result<(), IntegrityError> {
        self.ingest_snapshot(snapshot, false)
    }

    // A terminal snapshot is synthesized by `finalize` and may share a timestamp with the last
    // real one, so it's never treated as a stale re-poll.
    fn ingest_snapshot(
        &mut self,
        snapshot: Snapshot,
        terminal: bool,
    ) -> Result<(), IntegrityError> {
        self.positions
            .observe(snapshot.recorded_at, snapshot.distance_to_end);

        // Heading somewhere off this part of the route
        let next_idx = match self.schedule.position(&snapshot.next_stop) {
            Some(idx) => idx,
            None => {
                if !self.underway.is_empty() {
                    self.left_route = true;
                }
                return Ok(());
            }
        };

        let previous = match self.underway.front() {
            Some(previous) => previous.clone(),
            None => {
                self.remember(snapshot);
                return Ok(());
            }
        };
        // The feed hasn't heard from the bus since the last check
        if !terminal && previous.recorded_at == snapshot.recorded_at {
            return Ok(());
        }
        if snapshot.recorded_at < previous.recorded_at {
            return Err(IntegrityError::NonPositiveElapsed {
                previous: previous.recorded_at,
                current: snapshot.recorded_at,
            });
        }
        // Nothing new; the bus hasn't passed anything not already known
        if self.arrivals.is_resolved(next_idx) {
            self.remember(snapshot);
            return Ok(());
        }

        let interpolated = self.interpolate_missed_stops(&previous, &snapshot, next_idx)?;

        if self.start_time.is_none() {
            self.start_time = Some(snapshot.recorded_at);
        }
        for (idx, time) in interpolated {
            self.arrivals.set(idx, time);
        }
        // Being at a stop and having skipped earlier ones aren't mutually exclusive
        if next_idx > 0 && snapshot.is_at_stop {
            self.arrivals.set(next_idx, snapshot.recorded_at);
        }
        // Buses often lay over at the first stop, so record the last time it was seen there
        if next_idx == 1 && !self.arrivals.is_resolved(0) {
            self.arrivals.set(0, previous.recorded_at);
        }

        self.remember(snapshot);
        Ok(())
    }

    // Every still-unknown stop before the next one was passed sometime between the two
    // snapshots. Assume constant speed in between.
    //
    // previous-----S------S-----current
    // 0s                        100s
    // 0m          150m   320m   600m
    //
    // Offsets are truncated to whole seconds, and a stop can't be placed past the current
    // snapshot, so results fall in [previous, current] with both ends inclusive. A stop exactly
    // where the bus previously was gets the previous time.
    fn interpolate_missed_stops(
        &self,
        previous: &Snapshot,
        current: &Snapshot,
        next_idx: usize,
    ) -> Result<Vec<(usize, NaiveDateTime)>, IntegrityError> {
        let elapsed_secs = (current.recorded_at - previous.recorded_at).num_seconds();
        let traveled = previous.distance_to_end.inner_meters() - current.distance_to_end.inner_meters();

        let mut results = Vec::new();
        for idx in 0..next_idx {
            if self.arrivals.is_resolved(idx) {
                continue;
            }
            let stop = self.schedule.stop(idx);
            // Tiny negative distances are GPS noise right at the stop
            let to_stop =
                (stop.distance.inner_meters() - previous.distance_along_route.inner_meters()).trunc();
            if to_stop < 0.0 {
                return Err(IntegrityError::StopBehindBus {
                    stop: stop.id.clone(),
                    meters: -to_stop,
                });
            }
            if traveled <= 0.0 {
                return Err(IntegrityError::NoForwardProgress {
                    stop: stop.id.clone(),
                    meters: traveled,
                });
            }

            let fraction = (to_stop / traveled).min(1.0);
            let offset = (elapsed_secs as f64 * fraction) as i64;
            debug!(
                "{} passed {} unobserved: {}m of {}m in {}s, so {}s after {}",
                self.number, stop.id, to_stop, traveled, elapsed_secs, offset, previous.recorded_at
            );
            results.push((idx, previous.recorded_at + chrono::Duration::seconds(offset)));
        }
        Ok(results)
    }

    fn remember(&mut self, snapshot: Snapshot) {
        self.underway.push_front(snapshot);
        self.underway.truncate(self.max_positions);
    }

    /// Called once the bus is gone from the feed, either because it passed the destination or
    /// left service. Assumes it reached the destination at `last_seen_at`, fills in anything
    /// missed on the way, and produces a trajectory if every segment is known.
    ///
    /// A bus that never produced any arrival times yields nothing.
    pub fn finalize(
        mut self,
        last_seen_at: NaiveDateTime,
    ) -> Result<Option<CompletedTrajectory>, IntegrityError> {
        if self.arrivals.none_resolved() {
            debug!("{} never produced any arrival times", self.number);
            return Ok(None);
        }

        let terminus = self.schedule.terminus().clone();
        self.ingest_snapshot(
            Snapshot {
                recorded_at: last_seen_at,
                next_stop: terminus.id,
                distance_along_route: terminus.distance,
                distance_to_end: Distance::ZERO,
                distance_to_next_stop: Distance::ZERO,
                is_at_stop: true,
            },
            true,
        )?;
        Ok(self.to_completed_trajectory())
    }

    fn to_completed_trajectory(&self) -> Option<CompletedTrajectory> {
        if !self.has_full_data {
            info!("{} wasn't seen from the start of the route; discarding", self);
            return None;
        }
        let intervals = self.segment_intervals();
        let segment_intervals: Vec<Duration> = intervals.iter().flatten().copied().collect();
        if segment_intervals.len() != intervals.len() {
            info!(
                "{} still has unknown segments; discarding: {:?}",
                self, intervals
            );
            return None;
        }
        if segment_intervals.iter().any(|d| *d < Duration::ZERO) {
            warn!(
                "{} has a segment going back in time; discarding: {:?}",
                self, intervals
            );
            return None;
        }
        let start_time = self.start_time?;
        Some(CompletedTrajectory {
            route: self.route.clone(),
            destination: self.destination.clone(),
            start_time,
            segment_intervals,
            signal_times: self.signal_times,
            prediction_error: self.prediction_error(),
        })
    }

    // Positive when the bus arrived later than first projected
    fn prediction_error(&self) -> Option<Duration> {
        let projected = self.first_projected_arrival?;
        let actual = self.arrivals.get(self.arrivals.len() - 1)?;
        Some(Duration::seconds((actual - projected).num_seconds() as f64))
    }

    /// True once the bus has reached the destination or gone past the end of its schedule. It
    /// should be finalized; nothing it reports afterwards is about this trip.
    pub fn passed_destination(&self) -> bool {
        self.left_route || self.arrivals.is_resolved(self.arrivals.len() - 1)
    }

    pub fn segment_intervals(&self) -> Vec<Option<Duration>> {
        segment_intervals(&self.arrivals)
    }

    /// Compare against history and decide what the bus means for someone waiting at the stop.
    pub fn update_estimate(
        &mut self,
        search: &SimilaritySearch,
        history: &[HistoricalTrajectory],
        thresholds: &SignalThresholds,
    ) -> Option<&Estimate> {
        self.estimate = search.estimate(self.start_time, &self.segment_intervals(), history);
        if self.first_projected_arrival.is_none() {
            if let (Some(est), Some(last)) = (&self.estimate, self.underway.front()) {
                self.first_projected_arrival = Some(
                    last.recorded_at + chrono::Duration::seconds(est.seconds_remaining as i64),
                );
            }
        }
        let signal = self
            .estimate
            .as_ref()
            .map(|est| Signal::from_seconds(est.seconds_remaining, thresholds));
        self.set_signal(signal);
        self.estimate.as_ref()
    }

    fn set_signal(&mut self, signal: Option<Signal>) {
        let last_seen = self.underway.front().map(|s| s.recorded_at);
        match signal {
            Some(Signal::Near) if self.signal_times.near_at.is_none() => {
                self.signal_times.near_at = last_seen;
            }
            Some(Signal::Imminent) if self.signal_times.imminent_at.is_none() => {
                self.signal_times.imminent_at = last_seen;
            }
            _ => {}
        }
        self.signal = signal;
    }

    pub fn current_estimate(&self) -> Option<&Estimate> {
        self.estimate.as_ref()
    }

    pub fn signal(&self) -> Option<Signal> {
        self.signal
    }

    pub fn signal_times(&self) -> SignalTimes {
        self.signal_times
    }

    /// A rough guess from recent speed alone, ignoring history
    pub fn time_away_by_speed(&self) -> Duration {
        self.positions.time_away()
    }

    pub fn arrivals(&self) -> &StopArrivals {
        &self.arrivals
    }

    pub fn schedule(&self) -> &StopSchedule {
        &self.schedule
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    pub fn first_projected_arrival(&self) -> Option<NaiveDateTime> {
        self.first_projected_arrival
    }

    pub fn has_full_data(&self) -> bool {
        self.has_full_data
    }

    /// The most recent snapshot while underway
    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.underway.front()
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Bus #{}{} {}/{}",
            self.number,
            if self.has_full_data { "" } else { "*" },
            self.route,
            self.destination
        )?;
        if let Some(ref est) = self.estimate {
            write!(f, " {:.0}s away", est.seconds_remaining)?;
        }
        Ok(())
    }
}
