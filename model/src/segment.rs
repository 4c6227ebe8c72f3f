use geom::Duration;

use crate::StopArrivals;

/// Travel time between each pair of consecutive stops, in schedule order. There's always one
/// entry per pair; it's `None` unless both arrivals are known.
pub fn segment_intervals(arrivals: &StopArrivals) -> Vec<Option<Duration>> {
    arrivals
        .times()
        .windows(2)
        .map(|pair| match (pair[0], pair[1]) {
            (Some(t1), Some(t2)) => Some(Duration::seconds((t2 - t1).num_seconds() as f64)),
            _ => None,
        })
        .collect()
}

/// How far along the route a trajectory is known: the index of the first unknown segment, or the
/// number of segments if everything is known.
pub fn truncation_index(intervals: &[Option<Duration>]) -> usize {
    intervals
        .iter()
        .position(|x| x.is_none())
        .unwrap_or(intervals.len())
}
