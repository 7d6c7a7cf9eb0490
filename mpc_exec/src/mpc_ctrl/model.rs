//! # Kinematic vehicle model
//!
//! Kinematic bicycle model extended with the cross-track and heading errors to
//! a cubic reference path. All quantities are expressed in the vehicle frame
//! captured at the start of the tick, so the initial position and heading are
//! normally zero.
//!
//! The same `step` function is used for latency projection and inside the
//! optimizer's dynamics constraints, so both always agree on how the vehicle
//! moves.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix6, Matrix6x2};
use serde::{Deserialize, Serialize};

// Internal
use super::{MpcCtrlError, NUM_ACTUATIONS, NUM_COEFFS, NUM_STATES};
use util::maths::{poly_deriv_val, poly_val};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state of the vehicle at one point in the horizon.
///
/// Frame: vehicle frame at the start of the tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Longitudinal position.
    ///
    /// Units: meters
    pub x_m: f64,

    /// Lateral position.
    ///
    /// Units: meters
    pub y_m: f64,

    /// Heading.
    ///
    /// Units: radians
    pub psi_rad: f64,

    /// Speed.
    ///
    /// Units: meters/second
    pub v_ms: f64,

    /// Cross-track error, the lateral offset of the reference from the vehicle.
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error to the reference path.
    ///
    /// Units: radians
    pub epsi_rad: f64,
}

/// An actuation pair applied over one transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Actuation {
    /// Steering angle, positive values turn the heading clockwise.
    ///
    /// Units: radians
    pub steer_rad: f64,

    /// Normalised throttle, negative values brake.
    ///
    /// Units: none, in [-1, 1]
    pub accel: f64,
}

/// Coefficients of the cubic reference path y = f(x), lowest power first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCoeffs(pub [f64; NUM_COEFFS]);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleState {
    /// Build a state from an ordered slice of `[x, y, psi, v, cte, epsi]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, MpcCtrlError> {
        if values.len() != NUM_STATES {
            return Err(MpcCtrlError::InputShape {
                input: "vehicle state",
                expected: NUM_STATES,
                found: values.len(),
            });
        }

        Ok(Self {
            x_m: values[0],
            y_m: values[1],
            psi_rad: values[2],
            v_ms: values[3],
            cte_m: values[4],
            epsi_rad: values[5],
        })
    }

    /// Get the state as an ordered array of `[x, y, psi, v, cte, epsi]`.
    pub fn to_array(&self) -> [f64; NUM_STATES] {
        [self.x_m, self.y_m, self.psi_rad, self.v_ms, self.cte_m, self.epsi_rad]
    }

    /// Returns true if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Actuation {
    /// Build an actuation from an ordered slice of `[steer, accel]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, MpcCtrlError> {
        if values.len() != NUM_ACTUATIONS {
            return Err(MpcCtrlError::InputShape {
                input: "actuation",
                expected: NUM_ACTUATIONS,
                found: values.len(),
            });
        }

        Ok(Self {
            steer_rad: values[0],
            accel: values[1],
        })
    }

    /// Get the actuation as an ordered array of `[steer, accel]`.
    pub fn to_array(&self) -> [f64; NUM_ACTUATIONS] {
        [self.steer_rad, self.accel]
    }
}

impl ReferenceCoeffs {
    /// Build the coefficients from a slice ordered lowest power first.
    pub fn from_slice(values: &[f64]) -> Result<Self, MpcCtrlError> {
        if values.len() != NUM_COEFFS {
            return Err(MpcCtrlError::InputShape {
                input: "reference coefficients",
                expected: NUM_COEFFS,
                found: values.len(),
            });
        }

        let mut coeffs = [0f64; NUM_COEFFS];
        coeffs.copy_from_slice(values);

        Ok(Self(coeffs))
    }

    /// Lateral offset of the reference at `x_m`, f(x).
    pub fn eval(&self, x_m: f64) -> f64 {
        poly_val(x_m, &self.0)
    }

    /// Slope of the reference at `x_m`, f'(x).
    pub fn slope(&self, x_m: f64) -> f64 {
        poly_deriv_val(x_m, &self.0, 1)
    }

    /// Second derivative of the reference at `x_m`, f''(x).
    pub fn curvature_term(&self, x_m: f64) -> f64 {
        poly_deriv_val(x_m, &self.0, 2)
    }

    /// The desired heading at `x_m`, atan(f'(x)).
    pub fn desired_heading(&self, x_m: f64) -> f64 {
        self.slope(x_m).atan()
    }

    /// The full reflection of the reference about the vehicle's x axis,
    /// y = -f(x).
    ///
    /// Every coefficient changes sign, the constant term included. For a path
    /// through the origin this is the same as negating only the non-constant
    /// terms.
    pub fn reflected(&self) -> Self {
        let mut coeffs = self.0;
        for c in coeffs.iter_mut() {
            *c = -*c;
        }
        Self(coeffs)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Propagate the state over one timestep of `dt_s` seconds.
///
/// ```text
/// x'    = x + v cos(psi) dt
/// y'    = y + v sin(psi) dt
/// psi'  = psi - (v / lf) delta dt
/// v'    = v + a dt
/// cte'  = f(x) - y + v sin(epsi) dt
/// epsi' = psi - atan(f'(x)) - (v / lf) delta dt
/// ```
pub fn step(
    state: &VehicleState,
    act: &Actuation,
    coeffs: &ReferenceCoeffs,
    lf_m: f64,
    dt_s: f64,
) -> VehicleState {
    let VehicleState { x_m, y_m, psi_rad, v_ms, epsi_rad, .. } = *state;
    let (sin_psi, cos_psi) = psi_rad.sin_cos();

    let yaw_change_rad = v_ms / lf_m * act.steer_rad * dt_s;

    VehicleState {
        x_m: x_m + v_ms * cos_psi * dt_s,
        y_m: y_m + v_ms * sin_psi * dt_s,
        psi_rad: psi_rad - yaw_change_rad,
        v_ms: v_ms + act.accel * dt_s,
        cte_m: coeffs.eval(x_m) - y_m + v_ms * epsi_rad.sin() * dt_s,
        epsi_rad: psi_rad - coeffs.desired_heading(x_m) - yaw_change_rad,
    }
}

/// Partial derivatives of `step` with respect to the state and actuation.
///
/// Returns `(A, B)` where `A[(i, j)] = d next_i / d state_j` and
/// `B[(i, j)] = d next_i / d act_j`, both in `[x, y, psi, v, cte, epsi]` and
/// `[steer, accel]` order.
pub fn step_jacobian(
    state: &VehicleState,
    act: &Actuation,
    coeffs: &ReferenceCoeffs,
    lf_m: f64,
    dt_s: f64,
) -> (Matrix6<f64>, Matrix6x2<f64>) {
    let VehicleState { x_m, psi_rad, v_ms, epsi_rad, .. } = *state;
    let (sin_psi, cos_psi) = psi_rad.sin_cos();
    let (sin_epsi, cos_epsi) = epsi_rad.sin_cos();

    let slope = coeffs.slope(x_m);
    let d_psides_dx = coeffs.curvature_term(x_m) / (1.0 + slope * slope);
    let d_yaw_dv = act.steer_rad / lf_m * dt_s;
    let d_yaw_dsteer = v_ms / lf_m * dt_s;

    #[rustfmt::skip]
    let a = Matrix6::new(
        1.0,           0.0,  -v_ms * sin_psi * dt_s, cos_psi * dt_s,  0.0, 0.0,
        0.0,           1.0,  v_ms * cos_psi * dt_s,  sin_psi * dt_s,  0.0, 0.0,
        0.0,           0.0,  1.0,                    -d_yaw_dv,       0.0, 0.0,
        0.0,           0.0,  0.0,                    1.0,             0.0, 0.0,
        slope,         -1.0, 0.0,                    sin_epsi * dt_s, 0.0, v_ms * cos_epsi * dt_s,
        -d_psides_dx,  0.0,  1.0,                    -d_yaw_dv,       0.0, 0.0,
    );

    #[rustfmt::skip]
    let b = Matrix6x2::new(
        0.0,           0.0,
        0.0,           0.0,
        -d_yaw_dsteer, 0.0,
        0.0,           dt_s,
        0.0,           0.0,
        -d_yaw_dsteer, 0.0,
    );

    (a, b)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
