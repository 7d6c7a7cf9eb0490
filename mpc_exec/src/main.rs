//! Main MPC executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise MpcCtrl
//!     - Main loop, once per cycle:
//!         - Acquire telemetry (simulated plant or recorded frames)
//!         - Reference preparation and latency compensation
//!         - MpcCtrl processing, with the failure policy on a failed solve
//!         - Send the reply
//!         - Write archives
//!
//! # Usage
//!
//! `mpc_exec sim` runs the controller against the in-process plant,
//! `mpc_exec replay <file>` feeds recorded telemetry frames, one per line,
//! through the controller and logs the replies.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use mpc_lib::{
    cycle::MpcCycle,
    mpc_ctrl::MpcCtrl,
    params::MpcExecParams,
    sim::{Sim, SimError},
    telemetry::{self, Frame, MANUAL_REPLY},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line interface of the executable.
#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec", about = "Model-predictive path following controller")]
enum Cli {
    /// Run in closed loop against the simulated plant.
    #[structopt(name = "sim")]
    Sim {
        /// Sleep out the remainder of each cycle so the run takes real time.
        #[structopt(long)]
        realtime: bool,
    },

    /// Process recorded telemetry frames, one per line.
    #[structopt(name = "replay")]
    Replay {
        /// Path to the recording.
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },
}

/// Summary of a run, saved into the session directory.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    num_cycles: usize,
    num_fallbacks: usize,
    num_errors: usize,
    num_overruns: usize,
    mean_solve_time_s: f64,
    max_solve_time_s: f64,
    mean_cte_m: f64,
    max_cte_m: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    let cli = Cli::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "mpc_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", cli);

    // ---- LOAD PARAMETERS ----

    let exec_params: MpcExecParams = util::params::load(
        "mpc_exec.toml"
    ).wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut mpc_ctrl = MpcCtrl::default();
    mpc_ctrl.init("mpc_ctrl.toml", &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    info!("Module initialisation complete\n");

    let summary = match cli {
        Cli::Sim { realtime } => run_sim(mpc_ctrl, exec_params, realtime)?,
        Cli::Replay { path } => run_replay(mpc_ctrl, exec_params, path)?,
    };

    info!("Run summary: {:#?}", summary);
    session.save("summary.json", summary);

    // ---- SHUTDOWN ----

    info!("End of execution");

    session.exit();

    Ok(())
}

/// Closed loop run against the simulated plant.
fn run_sim(
    mpc_ctrl: MpcCtrl,
    exec_params: MpcExecParams,
    realtime: bool
) -> Result<RunSummary, Report> {

    let ctrl_params = mpc_ctrl.params()
        .cloned()
        .ok_or_else(|| eyre!("MpcCtrl has no parameters"))?;

    let mut sim = Sim::new(
        exec_params.sim.clone(),
        &ctrl_params,
        exec_params.actuation_latency_s
    ).wrap_err("Failed to initialise the simulation")?;

    let num_cycles = exec_params.sim.num_cycles;
    let num_fit_waypoints = exec_params.num_fit_waypoints;
    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);

    let mut cycle = MpcCycle::new(mpc_ctrl, exec_params);
    let mut summary = RunSummary::default();

    info!("Begining main loop\n");

    for _ in 0..num_cycles {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- DATA INPUT ----

        let tm = match sim.telemetry(num_fit_waypoints) {
            Ok(t) => t,
            Err(SimError::EndOfTrack) => {
                info!("End of the track reached, stopping");
                break
            },
            Err(e) => return Err(e).wrap_err("Could not get telemetry from the simulation")
        };

        // ---- CONTROL ALGORITHM PROCESSING ----

        match cycle.handle(&tm) {
            Ok(out) => {
                sim.command(out.reply.steering_angle, out.reply.throttle);

                if out.fallback {
                    summary.num_fallbacks += 1;
                }

                summary.mean_solve_time_s += out.report.solve_time_s;
                summary.max_solve_time_s = summary.max_solve_time_s
                    .max(out.report.solve_time_s);
            },
            Err(e) => {
                // No reply possible, stop the vehicle
                warn!("Error during MpcCtrl processing, braking: {}", e);
                sim.command(0.0, -1.0);
                summary.num_errors += 1;
            }
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = cycle.write() {
            warn!("Could not write the MpcCtrl archive: {}", e);
        }

        // ---- PLANT ----

        sim.advance(cycle_period.as_secs_f64());

        let cte_m = sim.cross_track_error();
        summary.mean_cte_m += cte_m;
        summary.max_cte_m = summary.max_cte_m.max(cte_m);

        debug!(
            "t = {:.2} s, pose = {:?}, cte = {:.3} m",
            sim.time_s(), sim.pose(), cte_m
        );

        // ---- CYCLE MANAGEMENT ----

        summary.num_cycles += 1;

        if check_cycle(cycle_start_instant, cycle_period, realtime) {
            summary.num_overruns += 1;
        }
    }

    if summary.num_cycles > 0 {
        summary.mean_solve_time_s /= summary.num_cycles as f64;
        summary.mean_cte_m /= summary.num_cycles as f64;
    }

    Ok(summary)
}

/// Run recorded telemetry frames through the controller.
fn run_replay(
    mpc_ctrl: MpcCtrl,
    exec_params: MpcExecParams,
    path: PathBuf
) -> Result<RunSummary, Report> {

    let recording = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("Could not read the recording {:?}", path))?;

    let mut cycle = MpcCycle::new(mpc_ctrl, exec_params);
    let mut summary = RunSummary::default();

    info!("Replaying {:?}\n", path);

    for (line_num, line) in recording.lines().enumerate() {

        let reply = match telemetry::decode(line) {
            Ok(Frame::Telemetry(tm)) => match cycle.handle(&tm) {
                Ok(out) => {
                    if out.fallback {
                        summary.num_fallbacks += 1;
                    }
                    summary.mean_solve_time_s += out.report.solve_time_s;
                    summary.max_solve_time_s = summary.max_solve_time_s
                        .max(out.report.solve_time_s);

                    telemetry::encode_steer(&out.reply)
                        .wrap_err("Could not encode the reply")?
                },
                Err(e) => {
                    warn!("Line {}: error during MpcCtrl processing: {}", line_num + 1, e);
                    summary.num_errors += 1;
                    continue
                }
            },
            Ok(Frame::Manual) => MANUAL_REPLY.to_string(),
            Ok(Frame::Ignored) => continue,
            Err(e) => {
                warn!("Line {}: could not decode the frame: {}", line_num + 1, e);
                summary.num_errors += 1;
                continue
            }
        };

        info!("{}", reply);

        if let Err(e) = cycle.write() {
            warn!("Could not write the MpcCtrl archive: {}", e);
        }

        summary.num_cycles += 1;
    }

    if summary.num_cycles > 0 {
        summary.mean_solve_time_s /= summary.num_cycles as f64;
    }

    Ok(summary)
}

/// Check the cycle against its period, sleeping out the remainder if running
/// in real time. Returns true if the cycle overran.
fn check_cycle(cycle_start_instant: Instant, cycle_period: Duration, realtime: bool) -> bool {
    let cycle_dur = Instant::now() - cycle_start_instant;

    match cycle_period.checked_sub(cycle_dur) {
        Some(d) => {
            if realtime {
                thread::sleep(d);
            }
            false
        },
        None => {
            warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            );
            true
        }
    }
}
