//! # MPC library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the MPC executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Model-predictive control module - computes steering and throttle to follow a reference path
pub mod mpc_ctrl;

/// Control cycle - telemetry in, reply out, with the failure policy applied
pub mod cycle;

/// Latency compensation - projects the measured state forward by the actuation latency
pub mod latency;

/// Executable parameters
pub mod params;

/// Reference preparation - vehicle frame transform and cubic fit of the waypoints
pub mod reference;

/// Simulated plant - a kinematic vehicle on a waypoint track
pub mod sim;

/// Telemetry codec - simulator frames in and out
pub mod telemetry;
