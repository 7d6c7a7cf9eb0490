//! # Reference preparation
//!
//! Converts a list of global waypoints ahead of the vehicle into the cubic
//! reference the controller tracks. Waypoints are moved into the vehicle frame
//! (origin at the vehicle, x axis along its heading) and fitted by least
//! squares, so the initial cross track and heading errors fall out of the fit
//! at x = 0.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use crate::mpc_ctrl::{ReferenceCoeffs, NUM_COEFFS};
use util::maths::poly_fit;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The fitted reference and the errors of a vehicle at the frame origin.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    /// Cubic fit in the vehicle frame, lowest power first.
    pub coeffs: ReferenceCoeffs,

    /// Waypoints in the vehicle frame.
    pub waypoints: Vec<(f64, f64)>,

    /// Cross track error at the origin, f(0).
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error at the origin, -atan(f'(0)).
    ///
    /// Units: radians
    pub epsi_rad: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while preparing the reference.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("Expected as many waypoint x values ({0}) as y values ({1})")]
    MismatchedLengths(usize, usize),

    #[error("A cubic fit needs at least 4 waypoints, found {0}")]
    TooFewWaypoints(usize),

    #[error("The waypoints do not determine a cubic (degenerate or non-finite)")]
    DegenerateFit,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Express global points in the frame of a vehicle at `(x_m, y_m)` with
/// heading `psi_rad`.
pub fn to_vehicle_frame(
    pts_x: &[f64],
    pts_y: &[f64],
    x_m: f64,
    y_m: f64,
    psi_rad: f64,
) -> Vec<(f64, f64)> {
    let (sin_psi, cos_psi) = psi_rad.sin_cos();

    pts_x
        .iter()
        .zip(pts_y.iter())
        .map(|(px, py)| {
            let dx = px - x_m;
            let dy = py - y_m;
            (dx * cos_psi + dy * sin_psi, dy * cos_psi - dx * sin_psi)
        })
        .collect()
}

/// Fit the reference to global waypoints as seen from the given vehicle pose.
pub fn prepare(
    pts_x: &[f64],
    pts_y: &[f64],
    x_m: f64,
    y_m: f64,
    psi_rad: f64,
) -> Result<Reference, ReferenceError> {
    if pts_x.len() != pts_y.len() {
        return Err(ReferenceError::MismatchedLengths(pts_x.len(), pts_y.len()));
    }
    if pts_x.len() < NUM_COEFFS {
        return Err(ReferenceError::TooFewWaypoints(pts_x.len()));
    }

    let waypoints = to_vehicle_frame(pts_x, pts_y, x_m, y_m, psi_rad);

    let (xs, ys): (Vec<f64>, Vec<f64>) = waypoints.iter().cloned().unzip();

    let fit = poly_fit(&xs, &ys, NUM_COEFFS - 1).ok_or(ReferenceError::DegenerateFit)?;

    if !fit.iter().all(|c| c.is_finite()) {
        return Err(ReferenceError::DegenerateFit);
    }

    let mut coeffs = [0.0; NUM_COEFFS];
    coeffs.copy_from_slice(&fit);
    let coeffs = ReferenceCoeffs(coeffs);

    let reference = Reference {
        cte_m: coeffs.eval(0.0),
        epsi_rad: -coeffs.desired_heading(0.0),
        coeffs,
        waypoints,
    };

    trace!("Reference coefficients: {:?}", reference.coeffs.0);

    Ok(reference)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
