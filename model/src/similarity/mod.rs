//! Estimates how long a live bus will take to reach the monitored stop, by finding past
//! trajectories that started in a similar part of the week and went similarly so far.

mod neighbors;
mod strategy;
mod stratum;

use chrono::NaiveDateTime;
use geom::Duration;

use crate::segment::truncation_index;
use crate::{HistoricalTrajectory, SearchConfig};

pub use neighbors::{features, nearest, Features, MAX_FEATURES};
pub use strategy::RemainingTimeStrategy;
pub use stratum::{Stratum, TimeOfDay};

#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub seconds_remaining: f64,
    /// How many segments of the bus's own trajectory were known
    pub truncation_index: usize,
    /// How many historical trajectories the estimate is based on
    pub neighbors: usize,
}

impl Estimate {
    pub fn remaining(&self) -> Duration {
        Duration::seconds(self.seconds_remaining)
    }
}

pub struct SimilaritySearch {
    config: SearchConfig,
}

impl SimilaritySearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// None means there's nothing to compare against yet, not that the bus is here.
    ///
    /// `intervals` is the bus's current, partially known trajectory. Only historical trajectories
    /// with the same number of segments are considered.
    pub fn estimate(
        &self,
        start_time: Option<NaiveDateTime>,
        intervals: &[Option<Duration>],
        pool: &[HistoricalTrajectory],
    ) -> Option<Estimate> {
        let idx = truncation_index(intervals);
        if idx == 0 {
            return None;
        }

        let candidates: Vec<&HistoricalTrajectory> = pool
            .iter()
            .filter(|traj| traj.segment_intervals.len() == intervals.len())
            .filter(|traj| self.is_plausible(traj))
            .collect();
        let candidates = same_stratum(start_time, candidates);
        if candidates.is_empty() {
            debug!("No comparable history out of {} trajectories", pool.len());
            return None;
        }

        let known: Vec<Duration> = intervals[..idx].iter().flatten().copied().collect();
        let query = features(&known, self.config.feature_window);
        let points: Vec<Features> = candidates
            .iter()
            .map(|traj| features(&traj.segment_intervals[..idx], self.config.feature_window))
            .collect();
        let closest = nearest(&points, &query, self.config.neighbors);
        if closest.is_empty() {
            return None;
        }

        let remaining: Vec<&[Duration]> = closest
            .iter()
            .map(|i| &candidates[*i].segment_intervals[idx..])
            .collect();
        let seconds_remaining = self.config.strategy.remaining_seconds(&remaining);
        debug!(
            "{} of {} comparable trajectories after segment {idx} say {seconds_remaining:.0}s remain",
            closest.len(),
            candidates.len()
        );
        Some(Estimate {
            seconds_remaining,
            truncation_index: idx,
            neighbors: closest.len(),
        })
    }

    fn is_plausible(&self, traj: &HistoricalTrajectory) -> bool {
        let min = self.config.min_segment_time();
        let max = self.config.max_segment_time();
        traj.segment_intervals
            .iter()
            .all(|d| *d >= min && *d <= max)
    }
}

// Without a start time, the bus hasn't started the route yet. Anything could be similar.
fn same_stratum(
    start_time: Option<NaiveDateTime>,
    candidates: Vec<&HistoricalTrajectory>,
) -> Vec<&HistoricalTrajectory> {
    let stratum = match start_time {
        Some(t) => Stratum::of(&t),
        None => return candidates,
    };
    candidates
        .into_iter()
        .filter(|traj| Stratum::of(&traj.start_time) == stratum)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    // December 2nd, 2014 was a Tuesday
    fn tuesday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 12, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn saturday(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 12, 6)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn history(start_time: NaiveDateTime, segments: &[f64]) -> HistoricalTrajectory {
        HistoricalTrajectory {
            start_time,
            segment_intervals: segments.iter().map(|x| Duration::seconds(*x)).collect(),
        }
    }

    fn partial(segments: &[Option<f64>]) -> Vec<Option<Duration>> {
        segments
            .iter()
            .map(|x| x.map(Duration::seconds))
            .collect()
    }

    #[test]
    fn test_mean_of_all_neighbors_when_pool_is_small() {
        let pool = vec![
            history(tuesday(8, 0), &[60.0, 60.0, 50.0, 70.0]),
            history(tuesday(8, 30), &[65.0, 55.0, 70.0, 70.0]),
            history(tuesday(9, 10), &[70.0, 50.0, 80.0, 80.0]),
        ];
        let mut config = SearchConfig::default();
        config.neighbors = 3;
        let search = SimilaritySearch::new(config);

        let estimate = search
            .estimate(
                Some(tuesday(8, 45)),
                &partial(&[Some(62.0), Some(58.0), None, None]),
                &pool,
            )
            .unwrap();
        // Remaining sums are 120, 140, 160
        assert_eq!(estimate.neighbors, 3);
        assert_eq!(estimate.truncation_index, 2);
        assert_relative_eq!(estimate.seconds_remaining, 140.0);
    }

    #[test]
    fn test_closest_neighbor_wins() {
        let pool = vec![
            history(tuesday(12, 0), &[30.0, 30.0, 100.0]),
            history(tuesday(13, 0), &[90.0, 90.0, 200.0]),
        ];
        let mut config = SearchConfig::default();
        config.neighbors = 1;
        let search = SimilaritySearch::new(config);

        let estimate = search
            .estimate(
                Some(tuesday(14, 0)),
                &partial(&[Some(85.0), Some(95.0), None]),
                &pool,
            )
            .unwrap();
        assert_eq!(estimate.neighbors, 1);
        assert_relative_eq!(estimate.seconds_remaining, 200.0);
    }

    #[test]
    fn test_implausible_history_is_ignored() {
        let pool = vec![
            history(tuesday(12, 0), &[60.0, 60.0, 5.0]),
            history(tuesday(12, 5), &[60.0, 900.0, 60.0]),
            history(tuesday(12, 10), &[60.0, 60.0, 100.0]),
        ];
        let search = SimilaritySearch::new(SearchConfig::default());
        let estimate = search
            .estimate(
                Some(tuesday(12, 30)),
                &partial(&[Some(60.0), Some(60.0), None]),
                &pool,
            )
            .unwrap();
        assert_eq!(estimate.neighbors, 1);
        assert_relative_eq!(estimate.seconds_remaining, 100.0);
    }

    #[test]
    fn test_only_same_stratum() {
        let pool = vec![
            history(saturday(8), &[60.0, 60.0, 100.0]),
            history(tuesday(18, 0), &[60.0, 60.0, 200.0]),
            history(tuesday(8, 0), &[60.0, 60.0, 300.0]),
        ];
        let search = SimilaritySearch::new(SearchConfig::default());
        let query = partial(&[Some(60.0), Some(60.0), None]);

        let weekend = search.estimate(Some(saturday(22)), &query, &pool).unwrap();
        assert_relative_eq!(weekend.seconds_remaining, 100.0);

        let evening = search
            .estimate(Some(tuesday(17, 30)), &query, &pool)
            .unwrap();
        assert_relative_eq!(evening.seconds_remaining, 200.0);

        // Nothing overnight
        assert_eq!(search.estimate(Some(tuesday(23, 0)), &query, &pool), None);

        // No start time yet compares against everything
        let anything = search.estimate(None, &query, &pool).unwrap();
        assert_eq!(anything.neighbors, 3);
        assert_relative_eq!(anything.seconds_remaining, 200.0);
    }

    #[test]
    fn test_no_estimate() {
        let search = SimilaritySearch::new(SearchConfig::default());
        let query = partial(&[Some(60.0), None]);
        assert_eq!(search.estimate(Some(tuesday(8, 0)), &query, &[]), None);

        // Nothing known about the bus yet
        let pool = vec![history(tuesday(8, 0), &[60.0, 60.0])];
        assert_eq!(
            search.estimate(Some(tuesday(8, 0)), &partial(&[None, None]), &pool),
            None
        );

        // Different number of segments
        let pool = vec![history(tuesday(8, 0), &[60.0, 60.0, 60.0])];
        assert_eq!(search.estimate(Some(tuesday(8, 0)), &query, &pool), None);
    }

    #[test]
    fn test_fully_known_trajectory_has_nothing_left() {
        let pool = vec![history(tuesday(8, 0), &[60.0, 60.0])];
        let search = SimilaritySearch::new(SearchConfig::default());
        let estimate = search
            .estimate(
                Some(tuesday(8, 0)),
                &partial(&[Some(60.0), Some(65.0)]),
                &pool,
            )
            .unwrap();
        assert_eq!(estimate.truncation_index, 2);
        assert_relative_eq!(estimate.seconds_remaining, 0.0);
    }

    #[test]
    fn test_feature_window_only_looks_at_recent_segments() {
        // Identical recently, very different early on
        let pool = vec![
            history(tuesday(12, 0), &[250.0, 250.0, 60.0, 60.0, 100.0]),
            history(tuesday(12, 0), &[60.0, 60.0, 200.0, 200.0, 300.0]),
        ];
        let mut config = SearchConfig::default();
        config.neighbors = 1;
        config.feature_window = 2;
        let search = SimilaritySearch::new(config);
        let estimate = search
            .estimate(
                Some(tuesday(12, 30)),
                &partial(&[Some(60.0), Some(60.0), Some(60.0), Some(60.0), None]),
                &pool,
            )
            .unwrap();
        assert_relative_eq!(estimate.seconds_remaining, 100.0);
    }
}
