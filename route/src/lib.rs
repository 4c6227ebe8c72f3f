#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod ids;
mod schedule;
mod snapshot;

pub use ids::{BusNumber, RouteName, StopID};
pub use schedule::{ScheduleError, ScheduledStop, StopSchedule};
pub use snapshot::Snapshot;
