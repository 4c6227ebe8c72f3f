use chrono::NaiveDateTime;

/// When a bus reached each stop of its schedule, keyed by the stop's position in that schedule.
/// Unknown until observed or interpolated.
#[derive(Clone, Debug, PartialEq)]
pub struct StopArrivals {
    times: Vec<Option<NaiveDateTime>>,
}

impl StopArrivals {
    pub fn new(num_stops: usize) -> Self {
        Self {
            times: vec![None; num_stops],
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn get(&self, idx: usize) -> Option<NaiveDateTime> {
        self.times.get(idx).copied().flatten()
    }

    pub fn is_resolved(&self, idx: usize) -> bool {
        self.get(idx).is_some()
    }

    pub(crate) fn set(&mut self, idx: usize, time: NaiveDateTime) {
        self.times[idx] = Some(time);
    }

    pub fn none_resolved(&self) -> bool {
        self.times.iter().all(|t| t.is_none())
    }

    pub fn all_resolved(&self) -> bool {
        self.times.iter().all(|t| t.is_some())
    }

    /// In schedule order
    pub fn times(&self) -> &[Option<NaiveDateTime>] {
        &self.times
    }
}
