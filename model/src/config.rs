use anyhow::{Context, Result};
use geom::{Distance, Duration};
use serde::{Deserialize, Serialize};

use crate::similarity::MAX_FEATURES;
use crate::{RemainingTimeStrategy, SignalThresholds};

/// Knobs for finding similar historical trajectories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Historical trajectories with any segment faster than this are assumed to be glitches
    pub min_segment_secs: f64,
    /// Or slower than this
    pub max_segment_secs: f64,
    pub neighbors: usize,
    /// How many of the most recent known segments to compare
    pub feature_window: usize,
    pub strategy: RemainingTimeStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_segment_secs: 20.0,
            max_segment_secs: 300.0,
            neighbors: 10,
            feature_window: MAX_FEATURES,
            strategy: RemainingTimeStrategy::MeanOfSums,
        }
    }
}

impl SearchConfig {
    pub fn min_segment_time(&self) -> Duration {
        Duration::seconds(self.min_segment_secs)
    }

    pub fn max_segment_time(&self) -> Duration {
        Duration::seconds(self.max_segment_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_segment_secs >= 0.0 && self.min_segment_secs <= self.max_segment_secs) {
            bail!(
                "Segment time bounds are backwards: {}s to {}s",
                self.min_segment_secs,
                self.max_segment_secs
            );
        }
        if self.neighbors == 0 {
            bail!("Need at least one neighbor");
        }
        if self.feature_window == 0 || self.feature_window > MAX_FEATURES {
            bail!(
                "feature_window must be between 1 and {MAX_FEATURES}, not {}",
                self.feature_window
            );
        }
        Ok(())
    }
}

/// How each bus is tracked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// How many past snapshots each bus remembers
    pub max_positions: usize,
    /// At the terminal where it starts, a bus sometimes reports itself a few meters along the
    /// route. Anything closer than this still counts as the start.
    pub max_gps_error_meters: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_positions: 64,
            max_gps_error_meters: 20.0,
        }
    }
}

impl TrackingConfig {
    pub fn max_gps_error(&self) -> Distance {
        Distance::meters(self.max_gps_error_meters)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_positions < 2 {
            bail!("max_positions must be at least 2, not {}", self.max_positions);
        }
        if !(self.max_gps_error_meters >= 0.0) {
            bail!("Bad max_gps_error_meters {}", self.max_gps_error_meters);
        }
        Ok(())
    }
}

/// Everything needed to monitor one stop. Missing fields in a config file take the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub search: SearchConfig,
    pub tracking: TrackingConfig,
    pub thresholds: SignalThresholds,
}

impl MonitorConfig {
    pub fn load<R: std::io::Read>(reader: R) -> Result<Self> {
        let config: Self =
            serde_json::from_reader(reader).context("couldn't parse monitor config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.tracking.validate()?;
        self.thresholds.validate()
    }
}
