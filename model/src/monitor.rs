use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use route::{BusNumber, RouteName, ScheduleError, Snapshot, StopID, StopSchedule};

use crate::{
    Bus, CompletedTrajectory, HistoricalTrajectory, IntegrityError, MonitorConfig, Signal,
    SimilaritySearch,
};

/// Everything the feed reported in one poll: the buses currently approaching the stop.
pub struct Cycle {
    pub polled_at: NaiveDateTime,
    pub observations: Vec<(BusNumber, Snapshot)>,
}

#[derive(Default)]
pub struct CheckOutcome {
    /// Buses that finished with a complete trajectory this cycle
    pub completed: Vec<CompletedTrajectory>,
    /// Buses dropped this cycle because their telemetry didn't make sense
    pub failures: Vec<(BusNumber, IntegrityError)>,
    /// The most urgent signal of any bus, or None if no bus has an estimate
    pub signal: Option<Signal>,
}

/// Tracks every bus on one route heading towards one stop.
pub struct StopMonitor {
    route: RouteName,
    destination: StopID,
    schedule: StopSchedule,
    config: MonitorConfig,
    search: SimilaritySearch,
    buses: BTreeMap<BusNumber, Bus>,
    /// Finalized after passing the destination, but still in the feed
    passed: BTreeSet<BusNumber>,
}

impl StopMonitor {
    pub fn new(
        route: RouteName,
        destination: StopID,
        schedule: StopSchedule,
        config: MonitorConfig,
    ) -> Result<Self, IntegrityError> {
        if !schedule.contains(&destination) {
            return Err(ScheduleError::UnknownStop(destination).into());
        }
        Ok(Self {
            route,
            destination,
            schedule,
            search: SimilaritySearch::new(config.search.clone()),
            config,
            buses: BTreeMap::new(),
            passed: BTreeSet::new(),
        })
    }

    /// Process one poll. A bus whose telemetry is inconsistent is dropped without affecting the
    /// others. Buses missing from the poll are finalized. `history` is the pool of past
    /// trajectories for this route and stop, as of this cycle.
    pub fn check(&mut self, cycle: Cycle, history: &[HistoricalTrajectory]) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let mut seen = BTreeSet::new();

        for (number, snapshot) in cycle.observations {
            seen.insert(number.clone());
            if self.passed.contains(&number) {
                continue;
            }
            if !self.buses.contains_key(&number) {
                if self.is_past_destination(&snapshot.next_stop) {
                    continue;
                }
                match Bus::new(
                    number.clone(),
                    self.route.clone(),
                    self.destination.clone(),
                    &self.schedule,
                    &snapshot,
                    &self.config.tracking,
                ) {
                    Ok(bus) => {
                        debug!("Now tracking {}", bus);
                        self.buses.insert(number.clone(), bus);
                    }
                    Err(err) => {
                        warn!("Can't track {}: {}", number, err);
                        outcome.failures.push((number, err));
                        continue;
                    }
                }
            }

            let recorded_at = snapshot.recorded_at;
            let result = match self.buses.get_mut(&number) {
                Some(bus) => bus.ingest(snapshot).map(|_| bus.passed_destination()),
                None => continue,
            };
            match result {
                Ok(true) => {
                    if let Some(bus) = self.buses.remove(&number) {
                        debug!("{} passed {}", number, self.destination);
                        finalize(bus, recorded_at, &mut outcome);
                    }
                    self.passed.insert(number);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("Dropping {}: {}", number, err);
                    self.buses.remove(&number);
                    outcome.failures.push((number, err));
                }
            }
        }
        // Once a finished bus leaves the feed, it may come back on a new trip
        self.passed.retain(|number| seen.contains(number));

        // Gone from the feed: passed the stop or left service
        let gone: Vec<BusNumber> = self
            .buses
            .keys()
            .filter(|number| !seen.contains(*number))
            .cloned()
            .collect();
        for number in gone {
            if let Some(bus) = self.buses.remove(&number) {
                finalize(bus, cycle.polled_at, &mut outcome);
            }
        }

        for bus in self.buses.values_mut() {
            bus.update_estimate(&self.search, history, &self.config.thresholds);
        }
        outcome.signal = self.most_urgent_signal();
        debug!(
            "{}/{} at {}: {} buses, signal {:?}",
            self.route,
            self.destination,
            cycle.polled_at,
            self.buses.len(),
            outcome.signal
        );
        outcome
    }

    /// Finalize every bus still being tracked, like when monitoring stops.
    pub fn finish(&mut self, last_seen_at: NaiveDateTime) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        for (_, bus) in std::mem::take(&mut self.buses) {
            finalize(bus, last_seen_at, &mut outcome);
        }
        outcome
    }

    // Buses first seen beyond the stop aren't approaching it
    fn is_past_destination(&self, next_stop: &StopID) -> bool {
        match (
            self.schedule.position(next_stop),
            self.schedule.position(&self.destination),
        ) {
            (Some(next), Some(destination)) => next > destination,
            _ => false,
        }
    }

    fn most_urgent_signal(&self) -> Option<Signal> {
        self.buses
            .values()
            .filter_map(|bus| bus.signal())
            .max_by_key(|signal| signal.urgency())
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values()
    }

    pub fn bus(&self, number: &BusNumber) -> Option<&Bus> {
        self.buses.get(number)
    }

    pub fn route(&self) -> &RouteName {
        &self.route
    }

    pub fn destination(&self) -> &StopID {
        &self.destination
    }
}

fn finalize(bus: Bus, last_seen_at: NaiveDateTime, outcome: &mut CheckOutcome) {
    let number = bus.number.clone();
    match bus.finalize(last_seen_at) {
        Ok(Some(traj)) => {
            info!(
                "{} finished a trajectory starting {}, {} total",
                number,
                traj.start_time,
                traj.total_time()
            );
            if let Some(error) = traj.prediction_error {
                debug!("{} first estimate was off by {}", number, error);
            }
            outcome.completed.push(traj);
        }
        Ok(None) => {}
        Err(err) => {
            warn!("Couldn't finalize {}: {}", number, err);
            outcome.failures.push((number, err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geom::{Distance, Duration};
    use route::ScheduledStop;

    fn schedule() -> StopSchedule {
        StopSchedule::new(
            [("A", 0.0), ("B", 500.0), ("C", 1200.0), ("D", 1600.0)]
                .into_iter()
                .map(|(id, meters)| ScheduledStop {
                    id: StopID::new(id),
                    distance: Distance::meters(meters),
                })
                .collect(),
        )
        .unwrap()
    }

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 12, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs)
    }

    // Monitoring stop C
    fn observation(bus: &str, secs: i64, next_stop: &str, along: f64) -> (BusNumber, Snapshot) {
        (
            BusNumber::new(bus),
            Snapshot {
                recorded_at: at(secs),
                next_stop: StopID::new(next_stop),
                distance_along_route: Distance::meters(along),
                distance_to_end: Distance::meters((1200.0 - along).max(0.0)),
                distance_to_next_stop: Distance::ZERO,
                is_at_stop: false,
            },
        )
    }

    fn cycle(secs: i64, observations: Vec<(BusNumber, Snapshot)>) -> Cycle {
        Cycle {
            polled_at: at(secs),
            observations,
        }
    }

    fn monitor() -> StopMonitor {
        StopMonitor::new(
            RouteName::new("B65"),
            StopID::new("C"),
            schedule(),
            MonitorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_stop() {
        assert!(StopMonitor::new(
            RouteName::new("B65"),
            StopID::new("Q"),
            schedule(),
            MonitorConfig::default(),
        )
        .is_err());
    }

    #[test]
    fn test_bus_finishes_when_it_leaves_the_feed() {
        let mut monitor = monitor();
        let outcome = monitor.check(cycle(0, vec![observation("1", 0, "A", 0.0)]), &[]);
        assert!(outcome.completed.is_empty());
        monitor.check(cycle(100, vec![observation("1", 100, "B", 300.0)]), &[]);
        monitor.check(cycle(200, vec![observation("1", 200, "C", 700.0)]), &[]);
        assert_eq!(monitor.buses().count(), 1);

        let outcome = monitor.check(cycle(300, Vec::new()), &[]);
        assert_eq!(monitor.buses().count(), 0);
        assert_eq!(outcome.completed.len(), 1);
        let traj = &outcome.completed[0];
        assert_eq!(traj.destination, StopID::new("C"));
        assert_eq!(traj.segment_intervals.len(), 2);
        assert_eq!(traj.total_time(), Duration::seconds(300.0));
    }

    #[test]
    fn test_bad_bus_doesnt_affect_others() {
        let mut monitor = monitor();
        monitor.check(
            cycle(
                0,
                vec![observation("good", 0, "A", 0.0), observation("bad", 50, "A", 0.0)],
            ),
            &[],
        );
        let outcome = monitor.check(
            cycle(
                100,
                vec![
                    observation("good", 100, "B", 300.0),
                    // Time went backwards
                    observation("bad", 10, "B", 300.0),
                ],
            ),
            &[],
        );
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, BusNumber::new("bad"));
        assert!(matches!(
            outcome.failures[0].1,
            IntegrityError::NonPositiveElapsed { .. }
        ));
        assert!(monitor.bus(&BusNumber::new("bad")).is_none());
        let good = monitor.bus(&BusNumber::new("good")).unwrap();
        assert_eq!(good.arrivals().get(0), Some(at(0)));
    }

    #[test]
    fn test_estimates_and_signal() {
        let history: Vec<HistoricalTrajectory> = [(90.0, 150.0), (100.0, 180.0), (110.0, 210.0)]
            .into_iter()
            .map(|(first, second)| HistoricalTrajectory {
                start_time: at(-3600),
                segment_intervals: vec![Duration::seconds(first), Duration::seconds(second)],
            })
            .collect();

        let mut monitor = monitor();
        let outcome = monitor.check(cycle(0, vec![observation("1", 0, "A", 0.0)]), &history);
        assert_eq!(outcome.signal, None);

        let outcome = monitor.check(
            cycle(100, vec![observation("1", 100, "C", 500.0)]),
            &history,
        );
        // The first segment is known, so all three neighbors weigh in: (150 + 180 + 210) / 3
        let bus = monitor.bus(&BusNumber::new("1")).unwrap();
        let estimate = bus.current_estimate().unwrap();
        assert_eq!(estimate.neighbors, 3);
        assert!((estimate.seconds_remaining - 180.0).abs() < 1e-9);
        assert_eq!(outcome.signal, Some(Signal::Imminent));
    }

    #[test]
    fn test_finish_discards_incomplete() {
        let mut monitor = monitor();
        monitor.check(cycle(0, vec![observation("mid", 0, "B", 300.0)]), &[]);
        monitor.check(cycle(60, vec![observation("mid", 60, "C", 900.0)]), &[]);
        let outcome = monitor.finish(at(120));
        assert!(outcome.completed.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(monitor.buses().count(), 0);
    }

    #[test]
    fn test_bus_heading_past_the_stop_is_ignored() {
        let mut monitor = monitor();
        for secs in [0, 30, 60] {
            let outcome = monitor.check(
                cycle(secs, vec![observation("9", secs, "D", 1300.0 + secs as f64)]),
                &[],
            );
            assert!(outcome.failures.is_empty());
            assert!(outcome.completed.is_empty());
        }
        assert_eq!(monitor.buses().count(), 0);
    }

    #[test]
    fn test_bus_finalized_once_it_reaches_the_stop() {
        let mut monitor = monitor();
        monitor.check(cycle(0, vec![observation("1", 0, "A", 0.0)]), &[]);
        monitor.check(cycle(100, vec![observation("1", 100, "B", 300.0)]), &[]);
        let mut arrived = observation("1", 200, "C", 1200.0);
        arrived.1.is_at_stop = true;
        let outcome = monitor.check(cycle(200, vec![arrived]), &[]);
        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].total_time(), Duration::seconds(200.0));
        assert_eq!(monitor.buses().count(), 0);

        // Still in the feed, heading further along the route
        let outcome = monitor.check(cycle(260, vec![observation("1", 260, "D", 1400.0)]), &[]);
        assert!(outcome.completed.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.signal, None);
        assert_eq!(monitor.buses().count(), 0);

        // Once gone, the same bus can start a new trip
        monitor.check(cycle(400, Vec::new()), &[]);
        monitor.check(cycle(900, vec![observation("1", 900, "A", 0.0)]), &[]);
        assert!(monitor.bus(&BusNumber::new("1")).is_some());
    }

    #[test]
    fn test_bus_finalized_once_it_leaves_the_schedule() {
        let mut monitor = monitor();
        monitor.check(cycle(0, vec![observation("1", 0, "A", 0.0)]), &[]);
        monitor.check(cycle(100, vec![observation("1", 100, "B", 300.0)]), &[]);
        // Telemetry names a stop that isn't on this route at all
        let outcome = monitor.check(cycle(250, vec![observation("1", 250, "Q", 1250.0)]), &[]);
        assert_eq!(monitor.buses().count(), 0);
        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].total_time(), Duration::seconds(250.0));
    }

    #[test]
    fn test_finish_right_after_the_last_snapshot() {
        let mut monitor = monitor();
        monitor.check(cycle(0, vec![observation("1", 0, "A", 0.0)]), &[]);
        monitor.check(cycle(100, vec![observation("1", 100, "C", 700.0)]), &[]);
        let outcome = monitor.finish(at(100));
        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].total_time(), Duration::seconds(100.0));
    }
}
