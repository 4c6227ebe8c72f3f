use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDateTime;
use geom::Distance;
use serde::Deserialize;

use route::{BusNumber, Snapshot, StopID};

use crate::Cycle;

/// Reads recorded telemetry, one row per bus per poll, and groups it into polling cycles in time
/// order.
pub fn load_cycles<R: std::io::Read>(reader: R) -> Result<Vec<Cycle>> {
    let mut per_cycle: BTreeMap<NaiveDateTime, Vec<(BusNumber, Snapshot)>> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: AVL = rec?;
        let polled_at = Snapshot::parse_recorded_at(&rec.polled_at)?;
        let snapshot = Snapshot {
            recorded_at: Snapshot::parse_recorded_at(&rec.recorded_at)?,
            next_stop: rec.next_stop,
            distance_along_route: meters(rec.distance_along_route)?,
            distance_to_end: meters(rec.distance_to_end)?,
            distance_to_next_stop: meters(rec.distance_to_next_stop)?,
            is_at_stop: rec.is_at_stop,
        };
        per_cycle
            .entry(polled_at)
            .or_insert_with(Vec::new)
            .push((rec.bus, snapshot));
    }

    Ok(per_cycle
        .into_iter()
        .map(|(polled_at, observations)| Cycle {
            polled_at,
            observations,
        })
        .collect())
}

fn meters(x: f64) -> Result<Distance> {
    if !x.is_finite() || x < 0.0 {
        bail!("Bad distance {x}");
    }
    Ok(Distance::meters(x))
}

#[derive(Deserialize)]
struct AVL {
    polled_at: String,
    bus: BusNumber,
    recorded_at: String,
    next_stop: StopID,
    distance_along_route: f64,
    distance_to_end: f64,
    distance_to_next_stop: f64,
    is_at_stop: bool,
}
