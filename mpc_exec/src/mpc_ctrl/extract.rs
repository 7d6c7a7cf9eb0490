//! Conversion of an optimal trajectory into the controller output

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{MpcCtrlError, Params, Solution, ACCEL_LIMIT};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Output command from MpcCtrl.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MpcOutput {
    /// Normalised steering demand, the first steering angle divided by the
    /// maximum steering angle, with the configured polarity applied.
    ///
    /// Units: between -1 and +1
    pub steer: f64,

    /// Normalised throttle demand, the first acceleration unchanged.
    ///
    /// Units: between -1 and +1
    pub throttle: f64,

    /// Predicted positions at steps 1 to N-1, in the same frame as the input
    /// state.
    ///
    /// Units: meters
    pub predicted_path: Vec<(f64, f64)>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the controller output from a solution.
///
/// The steering angle is normalised by `max_steer_rad`. Values are checked
/// against their limits after normalisation, anything outside [-1, 1] means the
/// solver produced an iterate outside its bounds and is reported as
/// `ActuationOutOfBounds`.
pub fn extract(solution: &Solution, params: &Params) -> Result<MpcOutput, MpcCtrlError> {
    let act = solution.first_actuation();

    let steer = params.steer_polarity.sign() * act.steer_rad / params.max_steer_rad;
    let throttle = act.accel;

    // Small tolerance on the limits for the division
    const EPS: f64 = 1e-9;

    if !(steer.abs() <= 1.0 + EPS) {
        return Err(MpcCtrlError::ActuationOutOfBounds {
            name: "steer",
            value: steer,
        });
    }
    if !(throttle.abs() <= ACCEL_LIMIT + EPS) {
        return Err(MpcCtrlError::ActuationOutOfBounds {
            name: "throttle",
            value: throttle,
        });
    }

    let predicted_path = (1..solution.layout().horizon_len())
        .map(|t| {
            let s = solution.state(t);
            (s.x_m, s.y_m)
        })
        .collect();

    let output = MpcOutput {
        steer: steer.max(-1.0).min(1.0),
        throttle: throttle.max(-ACCEL_LIMIT).min(ACCEL_LIMIT),
        predicted_path,
    };

    trace!(
        "MpcCtrl output: steer {:.4}, throttle {:.4}",
        output.steer,
        output.throttle
    );

    Ok(output)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
