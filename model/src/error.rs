use chrono::NaiveDateTime;

use route::{ScheduleError, StopID};

/// Telemetry that contradicts itself or the schedule. Only the bus that produced it is affected;
/// the caller should drop that bus and carry on with the rest.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("snapshot recorded at {current} is before the previous one at {previous}")]
    NonPositiveElapsed {
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("{stop} is {meters}m behind where the bus was previously seen")]
    StopBehindBus { stop: StopID, meters: f64 },

    #[error("bus passed {stop}, but moved {meters}m closer to the end")]
    NoForwardProgress { stop: StopID, meters: f64 },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
