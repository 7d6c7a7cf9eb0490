//! # Decision variable layout
//!
//! The optimizer's unknowns are flattened into one contiguous vector. States
//! come first, one block of `NUM_STATES` per horizon step, followed by one
//! block of `NUM_ACTUATIONS` per transition:
//!
//! ```text
//! | s_0 | s_1 | ... | s_{N-1} | u_0 | u_1 | ... | u_{N-2} |
//!   6     6           6         2     2           2
//! ```
//!
//! Within a state block the order is `[x, y, psi, v, cte, epsi]`, within an
//! actuation block `[steer, accel]`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::ops::Range;

use serde::Serialize;

use super::{Actuation, VehicleState, NUM_ACTUATIONS, NUM_STATES};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Offsets of each field inside a state block.
pub const X_OFFSET: usize = 0;
pub const Y_OFFSET: usize = 1;
pub const PSI_OFFSET: usize = 2;
pub const V_OFFSET: usize = 3;
pub const CTE_OFFSET: usize = 4;
pub const EPSI_OFFSET: usize = 5;

/// Offsets of each field inside an actuation block.
pub const STEER_OFFSET: usize = 0;
pub const ACCEL_OFFSET: usize = 1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Offset scheme for a horizon of `horizon_len` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    horizon_len: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Layout {
    /// Create the layout for the given horizon length.
    ///
    /// The horizon length must be at least 2, which is enforced by parameter
    /// validation.
    pub fn new(horizon_len: usize) -> Self {
        Self { horizon_len }
    }

    /// Number of predicted steps, N.
    pub fn horizon_len(&self) -> usize {
        self.horizon_len
    }

    /// Number of transitions between steps, N - 1.
    pub fn num_transitions(&self) -> usize {
        self.horizon_len.saturating_sub(1)
    }

    /// Total number of decision variables.
    pub fn num_vars(&self) -> usize {
        NUM_STATES * self.horizon_len + NUM_ACTUATIONS * self.num_transitions()
    }

    /// Number of dynamics equality constraints.
    pub fn num_dynamics_constraints(&self) -> usize {
        NUM_STATES * self.num_transitions()
    }

    /// Index of the first variable of the state block for step `t`.
    pub fn state_offset(&self, t: usize) -> usize {
        NUM_STATES * t
    }

    /// Index of the first variable of the actuation block for transition `t`.
    pub fn actuation_offset(&self, t: usize) -> usize {
        NUM_STATES * self.horizon_len + NUM_ACTUATIONS * t
    }

    /// Range of the state block for step `t`.
    pub fn state_range(&self, t: usize) -> Range<usize> {
        let start = self.state_offset(t);
        start..start + NUM_STATES
    }

    /// Range of the actuation block for transition `t`.
    pub fn actuation_range(&self, t: usize) -> Range<usize> {
        let start = self.actuation_offset(t);
        start..start + NUM_ACTUATIONS
    }

    /// Range of the dynamics residuals for transition `t`.
    pub fn constraint_range(&self, t: usize) -> Range<usize> {
        NUM_STATES * t..NUM_STATES * (t + 1)
    }

    /// Read the state for step `t` out of the decision vector.
    pub fn state(&self, vars: &[f64], t: usize) -> VehicleState {
        let s = &vars[self.state_range(t)];
        VehicleState {
            x_m: s[X_OFFSET],
            y_m: s[Y_OFFSET],
            psi_rad: s[PSI_OFFSET],
            v_ms: s[V_OFFSET],
            cte_m: s[CTE_OFFSET],
            epsi_rad: s[EPSI_OFFSET],
        }
    }

    /// Read the actuation for transition `t` out of the decision vector.
    pub fn actuation(&self, vars: &[f64], t: usize) -> Actuation {
        let u = &vars[self.actuation_range(t)];
        Actuation {
            steer_rad: u[STEER_OFFSET],
            accel: u[ACCEL_OFFSET],
        }
    }

    /// Write the state for step `t` into the decision vector.
    pub fn set_state(&self, vars: &mut [f64], t: usize, state: &VehicleState) {
        vars[self.state_range(t)].copy_from_slice(&state.to_array());
    }

    /// Write the actuation for transition `t` into the decision vector.
    pub fn set_actuation(&self, vars: &mut [f64], t: usize, act: &Actuation) {
        vars[self.actuation_range(t)].copy_from_slice(&act.to_array());
    }
}
