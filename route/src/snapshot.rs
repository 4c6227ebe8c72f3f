use anyhow::Result;
use chrono::NaiveDateTime;
use geom::Distance;

use crate::StopID;

/// One observation of a bus, already pulled out of the upstream feed.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub recorded_at: NaiveDateTime,
    /// The first stop the bus hasn't reached yet
    pub next_stop: StopID,
    pub distance_along_route: Distance,
    /// Remaining distance to the stop being monitored, not to the end of the whole route
    pub distance_to_end: Distance,
    pub distance_to_next_stop: Distance,
    /// The feed presents the bus as "at stop" for `next_stop`
    pub is_at_stop: bool,
}

impl Snapshot {
    /// Feeds report times like "2014-12-02T17:45:31.000-05:00". The fractional seconds and the
    /// offset are dropped; everything downstream works in the feed's local time.
    pub fn parse_recorded_at(raw: &str) -> Result<NaiveDateTime> {
        let trimmed = raw.get(..19).unwrap_or(raw);
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
            .map_err(|err| anyhow!("bad timestamp {raw}: {err}"))
    }
}
