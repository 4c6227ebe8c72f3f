//! Replays recorded telemetry through a stop monitor, as if polling the live feed, and reports
//! what the stop's lights would have shown.

#[macro_use]
extern crate log;

use abstutil::{prettyprint_usize, Timer};
use anyhow::Result;
use chrono::NaiveDateTime;
use fs_err::File;
use structopt::StructOpt;

use model::{
    load_cycles, load_history, prediction_rmse, write_trajectories, CheckOutcome,
    CompletedTrajectory, Cycle, HistoricalTrajectory, MonitorConfig, StopMonitor,
};
use route::{RouteName, StopID, StopSchedule};

#[derive(StructOpt)]
struct Args {
    /// The route short name, like B65
    #[structopt(long)]
    route: String,
    /// The stop to monitor, as the feed names it
    #[structopt(long)]
    stop: String,
    /// The path to a CSV file with `stop_id,distance_along_route` for every stop on the route, in
    /// order
    #[structopt(long)]
    schedule: String,
    /// The path to a CSV file of recorded telemetry
    #[structopt(long)]
    telemetry: String,
    /// The path to a CSV file of past trajectories
    #[structopt(long)]
    history: Option<String>,
    /// The path to a JSON config file. Anything missing takes the default.
    #[structopt(long)]
    config: Option<String>,
    /// Write trajectories completed during the replay here
    #[structopt(long)]
    output: Option<String>,
    /// Compare later buses against trajectories completed earlier in the replay too
    #[structopt(long)]
    learn: bool,
}

struct Inputs {
    monitor: StopMonitor,
    cycles: Vec<Cycle>,
    history: Vec<HistoricalTrajectory>,
}

impl Args {
    fn load(&self, timer: &mut Timer) -> Result<Inputs> {
        timer.start("load inputs");
        let config = match self.config {
            Some(ref path) => MonitorConfig::load(File::open(path)?)?,
            None => MonitorConfig::default(),
        };
        let route = RouteName::new(&self.route);
        let destination = StopID::new(&self.stop);
        let schedule = StopSchedule::load(File::open(&self.schedule)?)?;
        let history = match self.history {
            Some(ref path) => load_history(File::open(path)?, &route, &destination)?,
            None => Vec::new(),
        };
        let cycles = load_cycles(File::open(&self.telemetry)?)?;
        let monitor = StopMonitor::new(route, destination, schedule, config)?;
        timer.stop("load inputs");

        Ok(Inputs {
            monitor,
            cycles,
            history,
        })
    }
}

fn main() -> Result<()> {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    let mut timer = Timer::new("replay telemetry");
    let Inputs {
        mut monitor,
        cycles,
        mut history,
    } = args.load(&mut timer)?;
    info!(
        "Replaying {} polls of {}/{} against {} past trajectories",
        prettyprint_usize(cycles.len()),
        monitor.route(),
        monitor.destination(),
        prettyprint_usize(history.len())
    );

    timer.start("replay");
    let mut replay = Replay {
        completed: Vec::new(),
        failures: 0,
        learn: args.learn,
    };
    let mut last_poll = None;
    for cycle in cycles {
        let polled_at = cycle.polled_at;
        last_poll = Some(polled_at);
        let outcome = monitor.check(cycle, &history);
        print_status(&monitor, polled_at, &outcome);
        replay.absorb(outcome, &mut history);
    }
    if let Some(polled_at) = last_poll {
        let outcome = monitor.finish(polled_at);
        replay.absorb(outcome, &mut history);
    }
    timer.stop("replay");

    info!(
        "{} trajectories completed, {} buses dropped for bad telemetry",
        prettyprint_usize(replay.completed.len()),
        prettyprint_usize(replay.failures)
    );
    let estimated = replay
        .completed
        .iter()
        .filter(|traj| traj.prediction_error.is_some())
        .count();
    match prediction_rmse(&replay.completed) {
        Some(rmse) => println!(
            "{}/{}: first estimates of {} buses were off by {:.0}s RMSE",
            monitor.route(),
            monitor.destination(),
            prettyprint_usize(estimated),
            rmse
        ),
        None => println!(
            "{}/{}: no completed bus ever had an estimate",
            monitor.route(),
            monitor.destination()
        ),
    }
    if let Some(ref path) = args.output {
        write_trajectories(File::create(path)?, &replay.completed)?;
        info!("Wrote {}", path);
    }
    Ok(())
}

struct Replay {
    completed: Vec<CompletedTrajectory>,
    failures: usize,
    learn: bool,
}

impl Replay {
    fn absorb(&mut self, outcome: CheckOutcome, history: &mut Vec<HistoricalTrajectory>) {
        self.failures += outcome.failures.len();
        for traj in outcome.completed {
            if self.learn {
                history.push(traj.to_historical());
            }
            self.completed.push(traj);
        }
    }
}

fn print_status(monitor: &StopMonitor, polled_at: NaiveDateTime, outcome: &CheckOutcome) {
    println!("--- {} ({:?})", polled_at, outcome.signal);
    for bus in monitor.buses() {
        match bus.current_estimate() {
            Some(est) => println!(
                "  {} ({} neighbors after segment {})",
                bus, est.neighbors, est.truncation_index
            ),
            None => println!(
                "  {}, no estimate; roughly {} by speed",
                bus,
                bus.time_away_by_speed()
            ),
        }
    }
    for (number, err) in &outcome.failures {
        println!("  Dropped {}: {}", number, err);
    }
}
