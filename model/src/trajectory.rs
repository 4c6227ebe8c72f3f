use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use geom::Duration;
use serde::{Deserialize, Serialize};

use route::{RouteName, StopID};

use crate::SignalTimes;

/// A finished trip towards the monitored stop with every segment known. Only trips observed
/// from the start of the route become one of these; anything less would skew later estimates.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedTrajectory {
    pub route: RouteName,
    pub destination: StopID,
    pub start_time: NaiveDateTime,
    pub segment_intervals: Vec<Duration>,
    pub signal_times: SignalTimes,
    /// How much later the bus reached the destination than its first estimate said; negative if
    /// earlier. None if it never had an estimate.
    pub prediction_error: Option<Duration>,
}

impl CompletedTrajectory {
    pub fn total_time(&self) -> Duration {
        self.segment_intervals
            .iter()
            .fold(Duration::ZERO, |sum, x| sum + *x)
    }

    pub fn to_historical(&self) -> HistoricalTrajectory {
        HistoricalTrajectory {
            start_time: self.start_time,
            segment_intervals: self.segment_intervals.clone(),
        }
    }
}

/// The root-mean-square error of the first estimate of every trajectory that had one, in seconds.
pub fn prediction_rmse(trajectories: &[CompletedTrajectory]) -> Option<f64> {
    let errors: Vec<f64> = trajectories
        .iter()
        .filter_map(|traj| traj.prediction_error)
        .map(|d| d.inner_seconds())
        .collect();
    if errors.is_empty() {
        return None;
    }
    let sum_squares: f64 = errors.iter().map(|x| x * x).sum();
    Some((sum_squares / errors.len() as f64).sqrt())
}

/// A past trajectory to compare live buses against. Always for the same route and destination as
/// the bus being compared.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalTrajectory {
    pub start_time: NaiveDateTime,
    pub segment_intervals: Vec<Duration>,
}

/// Reads the trajectories for one route and destination, skipping rows for others.
pub fn load_history<R: std::io::Read>(
    reader: R,
    route: &RouteName,
    destination: &StopID,
) -> Result<Vec<HistoricalTrajectory>> {
    let mut results = Vec::new();
    let mut skipped = 0;
    for (idx, rec) in csv::Reader::from_reader(reader).deserialize().enumerate() {
        let rec: Record = rec?;
        if &rec.route != route || &rec.destination != destination {
            skipped += 1;
            continue;
        }
        let segment_intervals =
            parse_segments(&rec.segments).with_context(|| format!("history row {}", idx + 1))?;
        results.push(HistoricalTrajectory {
            start_time: rec.start_time,
            segment_intervals,
        });
    }
    debug!(
        "Loaded {} historical trajectories for {route}/{destination}, skipped {skipped} others",
        results.len()
    );
    Ok(results)
}

/// Appends rows in the same format `load_history` reads. Durations are written as whole seconds.
pub fn write_trajectories<W: std::io::Write>(
    writer: W,
    trajectories: &[CompletedTrajectory],
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for traj in trajectories {
        writer.serialize(Record {
            route: traj.route.clone(),
            destination: traj.destination.clone(),
            start_time: traj.start_time,
            segments: traj
                .segment_intervals
                .iter()
                .map(|d| (d.inner_seconds() as i64).to_string())
                .collect::<Vec<_>>()
                .join(" "),
            near_at: traj.signal_times.near_at,
            imminent_at: traj.signal_times.imminent_at,
            prediction_error: traj
                .prediction_error
                .map(|d| d.inner_seconds() as i64),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_segments(raw: &str) -> Result<Vec<Duration>> {
    let mut segments = Vec::new();
    for x in raw.split_whitespace() {
        let secs: f64 = x.parse().map_err(|err| anyhow!("bad segment {x}: {err}"))?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("bad segment {x}");
        }
        segments.push(Duration::seconds(secs));
    }
    if segments.is_empty() {
        bail!("no segments");
    }
    Ok(segments)
}

#[derive(Serialize, Deserialize)]
struct Record {
    route: RouteName,
    destination: StopID,
    start_time: NaiveDateTime,
    // Space-separated seconds
    segments: String,
    near_at: Option<NaiveDateTime>,
    imminent_at: Option<NaiveDateTime>,
    // Whole seconds. Older files don't have this column.
    #[serde(default)]
    prediction_error: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 12, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trajectory(route: &str, segments: &[f64]) -> CompletedTrajectory {
        CompletedTrajectory {
            route: RouteName::new(route),
            destination: StopID::new("MTA_305423"),
            start_time: at(8, 15),
            segment_intervals: segments.iter().map(|x| Duration::seconds(*x)).collect(),
            signal_times: SignalTimes {
                near_at: Some(at(8, 20)),
                imminent_at: None,
            },
            prediction_error: None,
        }
    }

    #[test]
    fn test_total_time() {
        assert_eq!(
            trajectory("B65", &[60.0, 90.0, 45.0]).total_time(),
            Duration::seconds(195.0)
        );
    }

    #[test]
    fn test_written_rows_load_as_history() {
        let mut out = Vec::new();
        write_trajectories(
            &mut out,
            &[
                trajectory("B65", &[60.0, 90.0, 45.0]),
                trajectory("B69", &[30.0, 30.0, 30.0]),
            ],
        )
        .unwrap();

        let history = load_history(
            out.as_slice(),
            &RouteName::new("B65"),
            &StopID::new("MTA_305423"),
        )
        .unwrap();
        assert_eq!(
            history,
            vec![trajectory("B65", &[60.0, 90.0, 45.0]).to_historical()]
        );
    }

    #[test]
    fn test_rmse_of_first_estimates() {
        let mut late = trajectory("B65", &[60.0, 90.0]);
        late.prediction_error = Some(Duration::seconds(30.0));
        let mut early = trajectory("B65", &[60.0, 90.0]);
        early.prediction_error = Some(Duration::seconds(-40.0));
        let never_estimated = trajectory("B65", &[60.0, 90.0]);

        assert_eq!(prediction_rmse(&[never_estimated.clone()]), None);
        let rmse = prediction_rmse(&[late, early, never_estimated]).unwrap();
        // sqrt((900 + 1600) / 2)
        assert!((rmse - 1250.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_older_files_without_prediction_error() {
        let input = "route,destination,start_time,segments,near_at,imminent_at\nB65,S,2014-12-02T08:15:00,60 70,,\n";
        let history =
            load_history(input.as_bytes(), &RouteName::new("B65"), &StopID::new("S")).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_bad_segments() {
        let input = "route,destination,start_time,segments,near_at,imminent_at\nB65,S,2014-12-02T08:15:00,60 abc,,\n";
        assert!(load_history(input.as_bytes(), &RouteName::new("B65"), &StopID::new("S")).is_err());
    }
}
