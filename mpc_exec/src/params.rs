//! # MPC Executable Parameters
//!
//! This module provide parameters for the MPC executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MpcExecParams {

    /// Target period of one control cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Total delay between a command being computed and it acting on the
    /// vehicle. The measured state is projected forward by this amount before
    /// solving, and the simulated plant applies commands this late.
    ///
    /// Units: seconds
    pub actuation_latency_s: f64,

    /// Number of upcoming waypoints used for the reference fit.
    pub num_fit_waypoints: usize,

    /// What to command when the optimizer fails.
    pub failure_policy: FailurePolicy,

    /// Simulated track settings.
    pub sim: SimParams,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimParams {

    /// Number of control cycles to simulate.
    pub num_cycles: usize,

    /// Integration step of the simulated plant.
    ///
    /// Units: seconds
    pub plant_dt_s: f64,

    /// Waypoint track, global x coordinates.
    ///
    /// Units: meters
    pub track_x_m: Vec<f64>,

    /// Waypoint track, global y coordinates.
    ///
    /// Units: meters
    pub track_y_m: Vec<f64>,

    /// Lateral offset of the vehicle from the first waypoint, positive to the
    /// left of the track.
    ///
    /// Units: meters
    #[serde(default)]
    pub initial_offset_m: f64,

    /// Initial heading of the vehicle.
    ///
    /// Units: radians
    pub initial_psi_rad: f64,

    /// Initial speed of the vehicle.
    ///
    /// Units: meters/second
    pub initial_speed_ms: f64,

    /// Acceleration produced by full throttle.
    ///
    /// Units: (meters/second^2) per unit throttle
    pub accel_gain_mss: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Command issued when a solve fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep sending the last good command.
    HoldPrevious,

    /// Centre the steering and apply full brake.
    Brake,
}
