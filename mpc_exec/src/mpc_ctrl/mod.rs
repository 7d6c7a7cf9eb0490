//! # Model-predictive control module
//!
//! Each tick the controller receives the vehicle state and a cubic fit of the
//! reference path in the vehicle frame, solves a finite-horizon tracking
//! program over the kinematic model and returns the first actuation of the
//! optimal sequence along with the predicted trajectory.
//!
//! The layering, bottom up, is:
//!
//! - `model`: the kinematic step and its Jacobian,
//! - `layout`: where each state and actuation lives in the decision vector,
//! - `cost`: the weighted tracking objective,
//! - `nlp` and `panoc`: the solver capability and its default backend,
//! - `optimizer`: the tracking program and the solve,
//! - `extract`: turning a solution into an output command,
//! - `state`: the cyclic module wrapping all of the above.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cost;
mod extract;
pub mod layout;
pub mod model;
pub mod nlp;
mod optimizer;
pub mod panoc;
pub(crate) mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cost::{CostBreakdown, CostWeights};
pub use extract::*;
pub use model::{Actuation, ReferenceCoeffs, VehicleState};
pub use nlp::{Minimum, NlpProblem, NlpSolver, NlpSolverError};
pub use optimizer::*;
pub use panoc::PanocSolver;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of state variables: x, y, psi, v, cte and epsi.
pub const NUM_STATES: usize = 6;

/// The number of actuation variables: steering angle and acceleration.
pub const NUM_ACTUATIONS: usize = 2;

/// The number of coefficients in the reference polynomial.
pub const NUM_COEFFS: usize = 4;

/// Magnitude limit of the normalised acceleration.
pub const ACCEL_LIMIT: f64 = 1.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Expected {input} to have {expected} elements but found {found}")]
    InputShape {
        input: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("The state or reference contains a non-finite value")]
    NonFiniteInput,

    #[error("Optimization failed: {reason}")]
    OptimizationFailure {
        reason: &'static str,
        best: Box<Solution>,
    },

    #[error("MpcCtrl has not been initialised")]
    NotInitialised,

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Extracted {name} of {value} is outside its bounds")]
    ActuationOutOfBounds { name: &'static str, value: f64 },

    #[error("Could not load the MPC parameters: {0}")]
    ParamLoad(util::params::LoadError),

    #[error("Could not initialise the archive: {0}")]
    Archive(util::archive::ArchiveError),

    #[error("Solver error: {0}")]
    Solver(#[from] NlpSolverError),
}
