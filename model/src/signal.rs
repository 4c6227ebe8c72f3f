use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// What a rider waiting for the monitored stop should do about one bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Plenty of time
    Far,
    /// Time to get ready
    Near,
    /// Leave now to make it
    Imminent,
    /// Can't make it anymore
    TooLate,
}

impl Signal {
    pub fn from_seconds(seconds_remaining: f64, thresholds: &SignalThresholds) -> Self {
        if seconds_remaining < thresholds.too_late_secs {
            Signal::TooLate
        } else if seconds_remaining < thresholds.imminent_secs {
            Signal::Imminent
        } else if seconds_remaining < thresholds.near_secs {
            Signal::Near
        } else {
            Signal::Far
        }
    }

    /// Used to pick the one signal a stop shows when several buses are approaching
    pub fn urgency(self) -> usize {
        match self {
            Signal::TooLate => 0,
            Signal::Far => 1,
            Signal::Near => 2,
            Signal::Imminent => 3,
        }
    }
}

/// In seconds remaining until the bus reaches the monitored stop. Depends on how long the walk
/// to that stop takes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    pub too_late_secs: f64,
    pub imminent_secs: f64,
    pub near_secs: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            too_late_secs: 60.0,
            imminent_secs: 240.0,
            near_secs: 600.0,
        }
    }
}

impl SignalThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.too_late_secs <= self.imminent_secs && self.imminent_secs <= self.near_secs) {
            bail!(
                "Signal thresholds must increase: too late {}s, imminent {}s, near {}s",
                self.too_late_secs,
                self.imminent_secs,
                self.near_secs
            );
        }
        Ok(())
    }
}

/// When a bus first turned each light on. Kept with completed trajectories to judge how well the
/// signals did afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SignalTimes {
    pub near_at: Option<NaiveDateTime>,
    pub imminent_at: Option<NaiveDateTime>,
}
