//! # Nonlinear programming capability
//!
//! The trajectory optimizer does not solve its program itself. It describes
//! the program through `NlpProblem` and hands it to any `NlpSolver`, so the
//! solver backend can be swapped without touching the cost or constraints.
//!
//! The program has the form
//!
//! ```text
//! minimise    f(z)
//! subject to  g(z) = 0
//!             lower <= z <= upper
//! ```
//!
//! where the equality constraints are explicit: once the free block of `z`
//! is chosen they fix every other variable. A solver may therefore work in
//! the free block alone, completing the dependent variables on demand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{ops::Range, time::Duration};

use serde::Serialize;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A nonlinear program with equality constraints and box bounds.
pub trait NlpProblem {
    /// Number of decision variables.
    fn num_vars(&self) -> usize;

    /// Number of equality constraints.
    fn num_eq_constraints(&self) -> usize;

    /// Objective value at `z`.
    fn cost(&self, z: &[f64]) -> f64;

    /// Objective gradient at `z`, written into `grad`.
    fn cost_gradient(&self, z: &[f64], grad: &mut [f64]);

    /// Equality constraint residuals g(z), written into `residual`.
    fn eq_constraints(&self, z: &[f64], residual: &mut [f64]);

    /// Range of the free variables within `z`.
    fn free_vars(&self) -> Range<usize>;

    /// Overwrite every variable outside `free_vars` with the value the
    /// equality constraints give it, so that g(z) = 0.
    fn fill_dependent(&self, z: &mut [f64]);

    /// Gradient of the objective with respect to the free variables, with the
    /// dependent variables following through the constraints. `z` must
    /// already be filled and `grad` has the length of `free_vars`.
    fn reduced_gradient(&self, z: &[f64], grad: &mut [f64]);

    /// Lower bounds on each variable, may be `NEG_INFINITY`.
    fn lower_bounds(&self) -> &[f64];

    /// Upper bounds on each variable, may be `INFINITY`.
    fn upper_bounds(&self) -> &[f64];
}

/// A solver able to find a local minimum of an `NlpProblem`.
pub trait NlpSolver {
    /// Minimise the problem starting from `initial_guess`.
    ///
    /// Not converging is not an error, it is reported through
    /// `Minimum::converged` along with the best iterate found. Errors are
    /// reserved for malformed calls.
    fn minimize<P: NlpProblem>(
        &self,
        problem: &P,
        initial_guess: &[f64],
    ) -> Result<Minimum, NlpSolverError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The result of a minimisation.
#[derive(Debug, Clone, Serialize)]
pub struct Minimum {
    /// The final iterate.
    pub solution: Vec<f64>,

    /// True if the solver met its tolerances.
    pub converged: bool,

    /// Number of iterations performed.
    pub iterations: usize,

    /// Wall-clock time spent in the solver.
    pub solve_time: Duration,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors from malformed calls to a solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NlpSolverError {
    #[error("Initial guess has {found} variables, the problem has {expected}")]
    InitialGuessShape { expected: usize, found: usize },

    #[error("Bounds have {found} entries, the problem has {expected} variables")]
    BoundsShape { expected: usize, found: usize },

    #[error("Lower bound exceeds upper bound for variable {0}")]
    InvertedBounds(usize),

    #[error("Free variables {start}..{end} are empty or exceed the {num_vars} variables")]
    FreeVars { start: usize, end: usize, num_vars: usize },
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Check a problem and initial guess are consistent before solving.
pub fn check_shapes<P: NlpProblem>(problem: &P, initial_guess: &[f64]) -> Result<(), NlpSolverError> {
    let n = problem.num_vars();

    if initial_guess.len() != n {
        return Err(NlpSolverError::InitialGuessShape {
            expected: n,
            found: initial_guess.len(),
        });
    }

    let free = problem.free_vars();
    if free.start >= free.end || free.end > n {
        return Err(NlpSolverError::FreeVars {
            start: free.start,
            end: free.end,
            num_vars: n,
        });
    }

    for bounds in [problem.lower_bounds(), problem.upper_bounds()].iter() {
        if bounds.len() != n {
            return Err(NlpSolverError::BoundsShape {
                expected: n,
                found: bounds.len(),
            });
        }
    }

    for (i, (lo, hi)) in problem
        .lower_bounds()
        .iter()
        .zip(problem.upper_bounds().iter())
        .enumerate()
    {
        if lo > hi {
            return Err(NlpSolverError::InvertedBounds(i));
        }
    }

    Ok(())
}

/// Project `z` onto the problem's box bounds.
///
/// Non-finite entries are left as they are, a diverged iterate must stay
/// recognisable as such.
pub fn project_onto_bounds<P: NlpProblem>(problem: &P, z: &mut [f64]) {
    for ((v, lo), hi) in z
        .iter_mut()
        .zip(problem.lower_bounds().iter())
        .zip(problem.upper_bounds().iter())
    {
        if v.is_finite() {
            *v = v.max(*lo).min(*hi);
        }
    }
}
