//! Reconstructs when buses reached each stop along a route from noisy telemetry, and predicts
//! how long until they reach a monitored stop by comparing against past trajectories.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod arrivals;
mod avl;
mod bus;
mod config;
mod error;
mod monitor;
mod segment;
mod signal;
mod similarity;
mod speed;
mod trajectory;

pub use self::arrivals::StopArrivals;
pub use self::avl::load_cycles;
pub use self::bus::Bus;
pub use self::config::{MonitorConfig, SearchConfig, TrackingConfig};
pub use self::error::IntegrityError;
pub use self::monitor::{CheckOutcome, Cycle, StopMonitor};
pub use self::segment::{segment_intervals, truncation_index};
pub use self::signal::{Signal, SignalThresholds, SignalTimes};
pub use self::similarity::{Estimate, RemainingTimeStrategy, SimilaritySearch, Stratum, TimeOfDay};
pub use self::speed::PositionHistory;
pub use self::trajectory::{
    load_history, prediction_rmse, write_trajectories, CompletedTrajectory, HistoricalTrajectory,
};
