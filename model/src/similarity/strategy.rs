use geom::Duration;
use serde::{Deserialize, Serialize};

/// How to turn the unfinished parts of the nearest historical trajectories into one estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemainingTimeStrategy {
    /// Average the total remaining time of each neighbor
    #[default]
    MeanOfSums,
    /// Take the median neighbor duration of each remaining segment, then add those up
    MedianPerSegment,
}

impl RemainingTimeStrategy {
    /// Each entry is one neighbor's segments from the truncation index to the end of the route.
    /// All entries have the same length. Returns seconds.
    pub fn remaining_seconds(self, remaining: &[&[Duration]]) -> f64 {
        if remaining.is_empty() {
            return 0.0;
        }
        match self {
            RemainingTimeStrategy::MeanOfSums => {
                let total: f64 = remaining
                    .iter()
                    .map(|segments| segments.iter().map(|d| d.inner_seconds()).sum::<f64>())
                    .sum();
                total / remaining.len() as f64
            }
            RemainingTimeStrategy::MedianPerSegment => {
                let num_segments = remaining[0].len();
                (0..num_segments)
                    .map(|idx| {
                        median(
                            remaining
                                .iter()
                                .filter_map(|segments| segments.get(idx))
                                .map(|d| d.inner_seconds())
                                .collect(),
                        )
                    })
                    .sum()
            }
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
