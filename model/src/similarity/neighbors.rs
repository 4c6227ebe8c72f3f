use geom::Duration;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// The most trailing segments ever compared
pub const MAX_FEATURES: usize = 8;

/// The trailing segment durations of a trajectory, in seconds. Shorter trajectories are
/// zero-padded; since the query and every candidate are cut to the same length, padding never
/// changes a distance.
pub type Features = [f64; MAX_FEATURES];

pub fn features(intervals: &[Duration], window: usize) -> Features {
    let window = window.min(MAX_FEATURES);
    let mut result = [0.0; MAX_FEATURES];
    let start = intervals.len().saturating_sub(window);
    for (slot, interval) in result.iter_mut().zip(&intervals[start..]) {
        *slot = interval.inner_seconds();
    }
    result
}

/// Indices of the `k` candidates closest to the query by Euclidean distance, closest first.
/// Returns fewer when there aren't `k` candidates.
pub fn nearest(candidates: &[Features], query: &Features, k: usize) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    let tree = RTree::bulk_load(
        candidates
            .iter()
            .enumerate()
            .map(|(idx, pt)| GeomWithData::new(*pt, idx))
            .collect(),
    );
    tree.nearest_neighbor_iter(query)
        .take(k)
        .map(|pt| pt.data)
        .collect()
}
