//! # PANOC solver backend
//!
//! Implements `NlpSolver` on top of the `optimization_engine` crate. The
//! problem's explicit equality constraints eliminate the dependent variables,
//! leaving a program over the free variables with only box bounds, which
//! PANOC solves with projected L-BFGS steps. Every iterate is therefore inside
//! the bounds and satisfies the equality constraints exactly.
//!
//! Before solving, each free variable is rescaled by the inverse square root
//! of the objective's curvature along it, relative to the flattest one. PANOC
//! takes a single step size from the stiffest direction, so without this the
//! soft directions barely move within the iteration budget.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use optimization_engine::{
    constraints::Rectangle,
    core::{
        panoc::{PANOCCache, PANOCOptimizer},
        ExitStatus, Optimizer, Problem,
    },
    FunctionCallResult,
};
use std::{
    cell::RefCell,
    ops::Range,
    time::{Duration, Instant},
};

// Internal
use super::{
    nlp::{check_shapes, Minimum, NlpProblem, NlpSolver, NlpSolverError},
    SolverParams,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Smallest scale factor applied to a free variable.
const MIN_SCALE: f64 = 1e-3;

/// Step used to measure the curvature along a free variable, relative to the
/// variable's magnitude.
const CURVATURE_STEP: f64 = 1e-6;

/// Curvature below which a direction is treated as flat.
const MIN_CURVATURE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// PANOC solver over the free variables of a problem.
#[derive(Debug, Clone, Copy)]
pub struct PanocSolver {
    params: SolverParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PanocSolver {
    /// Create a new solver with the given settings.
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    /// The solver's settings.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }
}

impl NlpSolver for PanocSolver {
    fn minimize<P: NlpProblem>(
        &self,
        problem: &P,
        initial_guess: &[f64],
    ) -> Result<Minimum, NlpSolverError> {
        check_shapes(problem, initial_guess)?;

        let start = Instant::now();
        let free = problem.free_vars();

        let mut z = initial_guess.to_vec();
        problem.fill_dependent(&mut z);

        let scale = curvature_scaling(problem, &z);
        trace!("Free variable scaling: {:?}", scale);

        // ---- SCALED PROBLEM ----

        let scaled = |bounds: &[f64]| -> Vec<f64> {
            bounds[free.clone()]
                .iter()
                .zip(scale.iter())
                .map(|(b, s)| b / s)
                .collect()
        };
        let lower = scaled(problem.lower_bounds());
        let upper = scaled(problem.upper_bounds());
        let bounds = Rectangle::new(Some(&lower), Some(&upper));

        // Full decision vector the scaled iterate is expanded into
        let work = RefCell::new(z.clone());

        let f = |xi: &[f64], c: &mut f64| -> FunctionCallResult {
            let mut z = work.borrow_mut();
            expand(problem, &free, &scale, xi, &mut z);
            *c = problem.cost(&z);
            Ok(())
        };
        let df = |xi: &[f64], grad: &mut [f64]| -> FunctionCallResult {
            let mut z = work.borrow_mut();
            expand(problem, &free, &scale, xi, &mut z);
            problem.reduced_gradient(&z, grad);
            grad.iter_mut().zip(scale.iter()).for_each(|(g, s)| *g *= s);
            Ok(())
        };

        // ---- SOLVE ----

        let mut xi: Vec<f64> = z[free.clone()]
            .iter()
            .zip(scale.iter())
            .map(|(v, s)| v / s)
            .collect();

        let budget = Duration::from_secs_f64(self.params.max_solve_time_s);

        let mut cache = PANOCCache::new(
            xi.len(),
            self.params.optimality_tolerance,
            self.params.lbfgs_memory,
        );
        let mut optimizer = PANOCOptimizer::new(Problem::new(&bounds, df, f), &mut cache)
            .with_max_iter(self.params.max_iterations)
            .with_max_duration(budget.checked_sub(start.elapsed()).unwrap_or_default());

        let (converged, iterations) = match optimizer.solve(&mut xi) {
            Ok(status) => {
                trace!(
                    "PANOC exit status: {:?}, fixed-point residual {:.3e}",
                    status.exit_status(),
                    status.norm_fpr()
                );

                (
                    status.exit_status() == ExitStatus::Converged,
                    status.iterations(),
                )
            }
            Err(e) => {
                // The engine stops on non-finite values, report what it had
                warn!("Solver engine error: {:?}", e);

                (false, 0)
            }
        };

        expand(problem, &free, &scale, &xi, &mut z);

        let minimum = Minimum {
            solution: z,
            converged,
            iterations,
            solve_time: start.elapsed(),
        };

        debug!(
            "PANOC finished in {:.3} ms ({} iterations, converged: {})",
            minimum.solve_time.as_secs_f64() * 1e3,
            minimum.iterations,
            minimum.converged
        );

        Ok(minimum)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Write the unscaled free variables into `z` and fill the dependent ones.
fn expand<P: NlpProblem>(
    problem: &P,
    free: &Range<usize>,
    scale: &[f64],
    xi: &[f64],
    z: &mut [f64],
) {
    for ((v, x), s) in z[free.clone()].iter_mut().zip(xi.iter()).zip(scale.iter()) {
        *v = x * s;
    }
    problem.fill_dependent(z);
}

/// Scale factor for each free variable at the filled point `z`.
///
/// The factor is `sqrt(c_min / c_i)`, where `c_i` is the objective's
/// curvature along free variable `i` measured by differencing the reduced
/// gradient, and `c_min` the smallest of them. Factors are limited to
/// `[MIN_SCALE, 1]`.
fn curvature_scaling<P: NlpProblem>(problem: &P, z: &[f64]) -> Vec<f64> {
    let free = problem.free_vars();

    let mut grad = vec![0.0; free.len()];
    let mut grad_shifted = vec![0.0; free.len()];
    let mut shifted = z.to_vec();

    problem.reduced_gradient(z, &mut grad);

    let curvature: Vec<f64> = free
        .clone()
        .enumerate()
        .map(|(i, j)| {
            let h = CURVATURE_STEP * z[j].abs().max(1.0);

            shifted.copy_from_slice(z);
            shifted[j] += h;
            problem.fill_dependent(&mut shifted);
            problem.reduced_gradient(&shifted, &mut grad_shifted);

            // NaN falls to the floor as well
            ((grad_shifted[i] - grad[i]) / h).max(MIN_CURVATURE)
        })
        .collect();

    let flattest = curvature.iter().cloned().fold(std::f64::INFINITY, f64::min);

    curvature
        .iter()
        .map(|c| (flattest / c).sqrt().max(MIN_SCALE).min(1.0))
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    /// minimise (u - 2)^2 + (x - 2)^2 subject to x = 1 - u, u <= 0.2
    struct LineProblem {
        lower: Vec<f64>,
        upper: Vec<f64>,
    }

    impl NlpProblem for LineProblem {
        fn num_vars(&self) -> usize {
            2
        }

        fn num_eq_constraints(&self) -> usize {
            1
        }

        fn cost(&self, z: &[f64]) -> f64 {
            (z[0] - 2.0).powi(2) + (z[1] - 2.0).powi(2)
        }

        fn cost_gradient(&self, z: &[f64], grad: &mut [f64]) {
            grad[0] = 2.0 * (z[0] - 2.0);
            grad[1] = 2.0 * (z[1] - 2.0);
        }

        fn eq_constraints(&self, z: &[f64], residual: &mut [f64]) {
            residual[0] = z[0] + z[1] - 1.0;
        }

        fn free_vars(&self) -> Range<usize> {
            0..1
        }

        fn fill_dependent(&self, z: &mut [f64]) {
            z[1] = 1.0 - z[0];
        }

        fn reduced_gradient(&self, z: &[f64], grad: &mut [f64]) {
            grad[0] = 2.0 * (z[0] - 2.0) - 2.0 * (z[1] - 2.0);
        }

        fn lower_bounds(&self) -> &[f64] {
            &self.lower
        }

        fn upper_bounds(&self) -> &[f64] {
            &self.upper
        }
    }

    /// Two free variables with curvatures six orders of magnitude apart,
    /// coupled through a dependent third: x = u0 + u1.
    ///
    /// minimise 1e4 (u0 - 0.1)^2 + 1e-2 (u1 - 0.5)^2 + (x - 0.6)^2
    struct StiffProblem {
        lower: Vec<f64>,
        upper: Vec<f64>,
    }

    impl NlpProblem for StiffProblem {
        fn num_vars(&self) -> usize {
            3
        }

        fn num_eq_constraints(&self) -> usize {
            1
        }

        fn cost(&self, z: &[f64]) -> f64 {
            1e4 * (z[0] - 0.1).powi(2) + 1e-2 * (z[1] - 0.5).powi(2) + (z[2] - 0.6).powi(2)
        }

        fn cost_gradient(&self, z: &[f64], grad: &mut [f64]) {
            grad[0] = 2e4 * (z[0] - 0.1);
            grad[1] = 2e-2 * (z[1] - 0.5);
            grad[2] = 2.0 * (z[2] - 0.6);
        }

        fn eq_constraints(&self, z: &[f64], residual: &mut [f64]) {
            residual[0] = z[2] - z[0] - z[1];
        }

        fn free_vars(&self) -> Range<usize> {
            0..2
        }

        fn fill_dependent(&self, z: &mut [f64]) {
            z[2] = z[0] + z[1];
        }

        fn reduced_gradient(&self, z: &[f64], grad: &mut [f64]) {
            let mut full = [0.0; 3];
            self.cost_gradient(z, &mut full);
            grad[0] = full[0] + full[2];
            grad[1] = full[1] + full[2];
        }

        fn lower_bounds(&self) -> &[f64] {
            &self.lower
        }

        fn upper_bounds(&self) -> &[f64] {
            &self.upper
        }
    }

    fn line_problem() -> LineProblem {
        LineProblem {
            lower: vec![-10.0, f64::NEG_INFINITY],
            upper: vec![0.2, f64::INFINITY],
        }
    }

    fn solver() -> PanocSolver {
        PanocSolver::new(SolverParams {
            optimality_tolerance: 1e-6,
            max_iterations: 1000,
            max_solve_time_s: 5.0,
            ..SolverParams::default()
        })
    }

    #[test]
    fn test_active_bound_and_equality() {
        let min = solver().minimize(&line_problem(), &[0.0, 0.0]).unwrap();

        // Unconstrained by the box the answer is (0.5, 0.5), the bound on z0
        // pushes it to (0.2, 0.8).
        assert!(min.converged);
        assert_relative_eq!(min.solution[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(min.solution[1], 0.8, epsilon = 1e-6);
        assert!(min.solution[0] <= 0.2);
    }

    #[test]
    fn test_badly_scaled() {
        let problem = StiffProblem {
            lower: vec![-1.0, -1.0, f64::NEG_INFINITY],
            upper: vec![1.0, 1.0, f64::INFINITY],
        };

        let min = solver().minimize(&problem, &[0.0; 3]).unwrap();

        assert!(min.converged);
        assert_relative_eq!(min.solution[0], 0.1, epsilon = 1e-4);
        assert_relative_eq!(min.solution[1], 0.5, epsilon = 1e-4);
        assert_relative_eq!(min.solution[2], min.solution[0] + min.solution[1]);
    }

    #[test]
    fn test_curvature_scaling() {
        let problem = StiffProblem {
            lower: vec![-1.0, -1.0, f64::NEG_INFINITY],
            upper: vec![1.0, 1.0, f64::INFINITY],
        };
        let mut z = vec![0.3, -0.2, 0.0];
        problem.fill_dependent(&mut z);

        let scale = curvature_scaling(&problem, &z);

        // Curvatures are 2e4 + 2 and 2e-2 + 2
        assert_relative_eq!(scale[1], 1.0);
        assert_relative_eq!(scale[0], (2.02f64 / 20002.0).sqrt(), max_relative = 1e-3);
    }

    #[test]
    fn test_rejects_bad_guess() {
        match solver().minimize(&line_problem(), &[0.0]) {
            Err(NlpSolverError::InitialGuessShape { expected: 2, found: 1 }) => (),
            r => panic!("Expected an initial guess shape error, got {:?}", r),
        }
    }
}
