//! # Trajectory optimizer
//!
//! Formulates the tracking program for one tick and hands it to an
//! `NlpSolver`:
//!
//! ```text
//! minimise    cost(z)
//! subject to  s_0 = initial state                        (box, lower = upper)
//!             s_{t+1} = step(s_t, u_t)   t = 0..N-2      (equality)
//!             -max_steer <= steer_t <= max_steer         (box)
//!             -1 <= accel_t <= 1                          (box)
//! ```
//!
//! Pinning the first state through the bounds rather than an equality means
//! every iterate the solver produces already starts exactly at the measured
//! state. The actuations are the free variables, given them the dynamics fix
//! every later state by rolling the model forward.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use nalgebra::Vector6;
use serde::Serialize;
use std::ops::Range;

// Internal
use super::{
    cost::{cost, cost_breakdown, cost_gradient, CostBreakdown},
    layout::{Layout, ACCEL_OFFSET, STEER_OFFSET},
    model::{step, step_jacobian},
    nlp::{project_onto_bounds, NlpProblem, NlpSolver},
    Actuation, MpcCtrlError, Params, ReferenceCoeffs, VehicleState, ACCEL_LIMIT,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Builds and solves the tracking program with a particular solver backend.
///
/// The optimizer holds no per-solve state, so a single instance can be shared
/// between any number of independent control loops.
#[derive(Debug, Clone)]
pub struct TrajectoryOptimizer<S: NlpSolver> {
    params: Params,
    layout: Layout,
    solver: S,
}

/// The tracking program for a single tick.
pub struct TrackingProblem<'a> {
    params: &'a Params,
    layout: Layout,
    initial_state: VehicleState,
    coeffs: ReferenceCoeffs,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// The decision trajectory found by a solve along with solver diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    layout: Layout,
    vars: Vec<f64>,

    /// True if the solver converged and the dynamics residual is within
    /// tolerance.
    pub converged: bool,

    /// Objective value of the trajectory
    pub cost: f64,

    /// Each weighted term of the objective
    pub cost_terms: CostBreakdown,

    /// Largest absolute dynamics residual
    pub max_violation: f64,

    /// Solver iterations
    pub iterations: usize,

    /// Solver wall-clock time
    ///
    /// Units: seconds
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: NlpSolver> TrajectoryOptimizer<S> {
    /// Create a new optimizer, rejecting non-physical parameters.
    pub fn new(params: Params, solver: S) -> Result<Self, MpcCtrlError> {
        params.validate()?;

        Ok(Self {
            layout: Layout::new(params.horizon_len),
            params,
            solver,
        })
    }

    /// The horizon configuration.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The decision variable layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Solve the tracking program for the given state and reference.
    ///
    /// `initial_state` is `[x, y, psi, v, cte, epsi]` and `coeffs` the cubic
    /// reference lowest power first. If `warm_actuations` is given it seeds the
    /// initial guess, otherwise a neutral zero actuation sequence is used. In
    /// both cases the guessed states are rolled forward through the model from
    /// `initial_state`.
    pub fn solve(
        &self,
        initial_state: &[f64],
        coeffs: &[f64],
        warm_actuations: Option<&[Actuation]>,
    ) -> Result<Solution, MpcCtrlError> {
        // Shape checks come before anything is built
        let state = VehicleState::from_slice(initial_state)?;
        let coeffs = ReferenceCoeffs::from_slice(coeffs)?;

        if !state.is_finite() || !coeffs.0.iter().all(|c| c.is_finite()) {
            return Err(MpcCtrlError::NonFiniteInput);
        }

        let problem = TrackingProblem::new(&self.params, self.layout, &state, coeffs);
        let guess = initial_guess(&self.params, self.layout, &state, &coeffs, warm_actuations);

        let minimum = self.solver.minimize(&problem, &guess)?;

        // Iterates from a projecting solver are already feasible for the box,
        // this keeps the guarantee for any backend.
        let mut vars = minimum.solution;
        project_onto_bounds(&problem, &mut vars);

        let max_violation = problem.max_violation(&vars);
        let cost_terms = cost_breakdown(
            &self.layout,
            &vars,
            &self.params.weights,
            self.params.ref_speed_ms,
        );

        let feasible = max_violation.is_finite()
            && max_violation <= self.params.solver.feasibility_tolerance;
        let finite = vars.iter().all(|v| v.is_finite());

        let solution = Solution {
            layout: self.layout,
            vars,
            converged: minimum.converged && feasible && finite,
            cost: cost_terms.total(),
            cost_terms,
            max_violation,
            iterations: minimum.iterations,
            solve_time_s: minimum.solve_time.as_secs_f64(),
        };

        debug!(
            "Solve: cost {:.4}, max violation {:.3e}, {:.3} ms",
            solution.cost,
            solution.max_violation,
            solution.solve_time_s * 1e3
        );

        if solution.converged {
            Ok(solution)
        }
        else {
            let reason = if !finite {
                "solution is not finite"
            }
            else if !minimum.converged {
                "solver did not converge within its budget"
            }
            else {
                "dynamics residual exceeds the feasibility tolerance"
            };

            warn!(
                "Optimization failed: {} (max violation {:.3e})",
                reason, solution.max_violation
            );

            Err(MpcCtrlError::OptimizationFailure {
                reason,
                best: Box::new(solution),
            })
        }
    }
}

impl<'a> TrackingProblem<'a> {
    /// Build the program for a tick.
    pub fn new(
        params: &'a Params,
        layout: Layout,
        initial_state: &VehicleState,
        coeffs: ReferenceCoeffs,
    ) -> Self {
        let n = layout.num_vars();
        let mut lower = vec![std::f64::NEG_INFINITY; n];
        let mut upper = vec![std::f64::INFINITY; n];

        // Pin the first state
        let s0 = initial_state.to_array();
        lower[layout.state_range(0)].copy_from_slice(&s0);
        upper[layout.state_range(0)].copy_from_slice(&s0);

        // Actuator limits
        for t in 0..layout.num_transitions() {
            let u = layout.actuation_offset(t);
            lower[u + STEER_OFFSET] = -params.max_steer_rad;
            upper[u + STEER_OFFSET] = params.max_steer_rad;
            lower[u + ACCEL_OFFSET] = -ACCEL_LIMIT;
            upper[u + ACCEL_OFFSET] = ACCEL_LIMIT;
        }

        Self {
            params,
            layout,
            initial_state: *initial_state,
            coeffs,
            lower,
            upper,
        }
    }

    /// Largest absolute dynamics residual of `z`.
    pub fn max_violation(&self, z: &[f64]) -> f64 {
        let mut residual = vec![0.0; self.num_eq_constraints()];
        self.eq_constraints(z, &mut residual);

        // NaN must not be hidden by max
        if residual.iter().any(|r| r.is_nan()) {
            return std::f64::NAN;
        }

        residual.iter().fold(0.0, |acc: f64, r| acc.max(r.abs()))
    }
}

impl<'a> NlpProblem for TrackingProblem<'a> {
    fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    fn num_eq_constraints(&self) -> usize {
        self.layout.num_dynamics_constraints()
    }

    fn cost(&self, z: &[f64]) -> f64 {
        cost(&self.layout, z, &self.params.weights, self.params.ref_speed_ms)
    }

    fn cost_gradient(&self, z: &[f64], grad: &mut [f64]) {
        cost_gradient(
            &self.layout,
            z,
            &self.params.weights,
            self.params.ref_speed_ms,
            grad,
        )
    }

    fn eq_constraints(&self, z: &[f64], residual: &mut [f64]) {
        for t in 0..self.layout.num_transitions() {
            let predicted = step(
                &self.layout.state(z, t),
                &self.layout.actuation(z, t),
                &self.coeffs,
                self.params.lf_m,
                self.params.timestep_s,
            )
            .to_array();

            let next = &z[self.layout.state_range(t + 1)];

            for ((r, n), p) in residual[self.layout.constraint_range(t)]
                .iter_mut()
                .zip(next.iter())
                .zip(predicted.iter())
            {
                *r = n - p;
            }
        }
    }

    fn free_vars(&self) -> Range<usize> {
        self.layout.actuation_offset(0)..self.layout.num_vars()
    }

    fn fill_dependent(&self, z: &mut [f64]) {
        let mut state = self.initial_state;
        self.layout.set_state(z, 0, &state);

        for t in 0..self.layout.num_transitions() {
            state = step(
                &state,
                &self.layout.actuation(z, t),
                &self.coeffs,
                self.params.lf_m,
                self.params.timestep_s,
            );
            self.layout.set_state(z, t + 1, &state);
        }
    }

    fn reduced_gradient(&self, z: &[f64], grad: &mut [f64]) {
        let mut full = vec![0.0; self.layout.num_vars()];
        self.cost_gradient(z, &mut full);

        let first_act = self.layout.actuation_offset(0);

        // Adjoint sweep: lambda_t is the total derivative of the cost with
        // respect to s_t, taking every later state into account.
        let last = self.layout.horizon_len() - 1;
        let mut lambda = Vector6::from_column_slice(&full[self.layout.state_range(last)]);

        for t in (0..self.layout.num_transitions()).rev() {
            let (a, b) = step_jacobian(
                &self.layout.state(z, t),
                &self.layout.actuation(z, t),
                &self.coeffs,
                self.params.lf_m,
                self.params.timestep_s,
            );

            let d_act = b.transpose() * lambda;
            let range = self.layout.actuation_range(t);

            for ((g, partial), total) in grad[range.start - first_act..range.end - first_act]
                .iter_mut()
                .zip(full[range].iter())
                .zip(d_act.iter())
            {
                *g = partial + total;
            }

            lambda = Vector6::from_column_slice(&full[self.layout.state_range(t)])
                + a.transpose() * lambda;
        }
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }
}

impl Solution {
    /// The decision variable layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The raw decision vector.
    pub fn vars(&self) -> &[f64] {
        &self.vars
    }

    /// Predicted state at step `t`.
    pub fn state(&self, t: usize) -> VehicleState {
        self.layout.state(&self.vars, t)
    }

    /// Actuation over transition `t`.
    pub fn actuation(&self, t: usize) -> Actuation {
        self.layout.actuation(&self.vars, t)
    }

    /// The actuation to apply now.
    pub fn first_actuation(&self) -> Actuation {
        self.actuation(0)
    }

    /// Every actuation in the horizon, in order.
    pub fn actuations(&self) -> Vec<Actuation> {
        (0..self.layout.num_transitions())
            .map(|t| self.actuation(t))
            .collect()
    }

    /// Every predicted state in the horizon, in order.
    pub fn states(&self) -> Vec<VehicleState> {
        (0..self.layout.horizon_len())
            .map(|t| self.state(t))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the initial guess for a solve.
///
/// Actuations are taken from `warm_actuations` where available, shifted so the
/// previous tick's second transition becomes this tick's first and the last one
/// repeated to fill the horizon. Without a warm start every actuation is zero.
/// States are then rolled forward through the model from `initial_state`, so
/// the guess always satisfies the dynamics exactly.
pub fn initial_guess(
    params: &Params,
    layout: Layout,
    initial_state: &VehicleState,
    coeffs: &ReferenceCoeffs,
    warm_actuations: Option<&[Actuation]>,
) -> Vec<f64> {
    let mut vars = vec![0.0; layout.num_vars()];
    layout.set_state(&mut vars, 0, initial_state);

    let mut state = *initial_state;

    for t in 0..layout.num_transitions() {
        let act = match warm_actuations {
            Some(acts) if !acts.is_empty() => {
                let a = acts[(t + 1).min(acts.len() - 1)];
                Actuation {
                    steer_rad: a.steer_rad.max(-params.max_steer_rad).min(params.max_steer_rad),
                    accel: a.accel.max(-ACCEL_LIMIT).min(ACCEL_LIMIT),
                }
            }
            _ => Actuation::default(),
        };

        layout.set_actuation(&mut vars, t, &act);
        state = step(&state, &act, coeffs, params.lf_m, params.timestep_s);
        layout.set_state(&mut vars, t + 1, &state);
    }

    vars
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::{
        params::test::reference_params, Minimum, NlpSolverError, PanocSolver, SolverParams,
    };
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn optimizer(params: Params) -> TrajectoryOptimizer<PanocSolver> {
        let solver = PanocSolver::new(params.solver);
        TrajectoryOptimizer::new(params, solver).unwrap()
    }

    fn solve(opt: &TrajectoryOptimizer<PanocSolver>, state: &[f64], coeffs: &[f64]) -> Solution {
        match opt.solve(state, coeffs, None) {
            Ok(s) => s,
            Err(e) => panic!("Solve failed: {}", e),
        }
    }

    /// Returns the initial guess shifted by `offset`.
    struct EchoSolver {
        converged: bool,
        offset: f64,
    }

    impl NlpSolver for EchoSolver {
        fn minimize<P: NlpProblem>(
            &self,
            _problem: &P,
            initial_guess: &[f64],
        ) -> Result<Minimum, NlpSolverError> {
            Ok(Minimum {
                solution: initial_guess.iter().map(|z| z + self.offset).collect(),
                converged: self.converged,
                iterations: 1,
                solve_time: Duration::from_millis(1),
            })
        }
    }

    #[test]
    fn test_equilibrium() {
        let opt = optimizer(reference_params());

        let sol = solve(&opt, &[0.0, 0.0, 0.0, 40.0, 0.0, 0.0], &[0.0; 4]);

        let act = sol.first_actuation();
        assert!(act.steer_rad.abs() < 1e-3, "steer = {}", act.steer_rad);
        assert!(act.accel.abs() < 1e-3, "accel = {}", act.accel);
        assert!(sol.cost < 1e-3);
    }

    #[test]
    fn test_first_state_pinned() {
        let opt = optimizer(reference_params());
        let initial = [1.0, -2.0, 0.1, 12.0, 0.4, -0.05];

        let sol = solve(&opt, &initial, &[0.5, 0.1, 0.0, 0.0]);

        assert!(sol.converged);
        assert_eq!(sol.state(0).to_array(), initial);
        assert!(sol.max_violation < 1e-9);
    }

    #[test]
    fn test_actuations_within_bounds() {
        let params = reference_params();
        let opt = optimizer(params.clone());

        // Far outside anything the reference configuration is tuned for, so
        // a failed solve's best trajectory has to respect the limits too.
        let sol = match opt.solve(
            &[0.0, 0.0, 1.2, 100.0, 100.0, 1.5],
            &[100.0, -3.0, 0.5, -0.01],
            None,
        ) {
            Ok(s) => s,
            Err(MpcCtrlError::OptimizationFailure { best, .. }) => *best,
            Err(e) => panic!("Unexpected solve error: {}", e),
        };

        for act in sol.actuations() {
            assert!(act.steer_rad.abs() <= params.max_steer_rad);
            assert!(act.accel.abs() <= ACCEL_LIMIT);
        }
    }

    #[test]
    fn test_steers_toward_offset_path() {
        // Path 5 m to the left of the vehicle. Positive steer turns clockwise,
        // so the correction must be negative.
        let opt = optimizer(reference_params());

        let sol = solve(&opt, &[0.0, 0.0, 0.0, 20.0, 5.0, 0.0], &[5.0, 0.0, 0.0, 0.0]);
        assert!(sol.first_actuation().steer_rad < 0.0);

        // And the mirror image
        let sol = solve(&opt, &[0.0, 0.0, 0.0, 20.0, -5.0, 0.0], &[-5.0, 0.0, 0.0, 0.0]);
        assert!(sol.first_actuation().steer_rad > 0.0);
    }

    #[test]
    fn test_offset_path_at_reference_speed() {
        // Shipped solver settings, so this also has to fit the real-time budget
        let mut params = reference_params();
        params.solver = SolverParams::default();
        let opt = optimizer(params.clone());

        let sol = solve(&opt, &[0.0, 0.0, 0.0, 40.0, 5.0, 0.0], &[5.0, 0.0, 0.0, 0.0]);

        let steer = sol.first_actuation().steer_rad;
        assert!(steer < 0.0, "steer = {}", steer);
        assert!(steer.abs() <= params.max_steer_rad);

        // The prediction closes on the path
        let states = sol.states();
        let last = states[states.len() - 1];
        assert!(last.y_m > 0.0);
        assert!(last.cte_m.abs() < 5.0);
    }

    #[test]
    fn test_mirror_symmetry() {
        let opt = optimizer(reference_params());

        let coeffs = ReferenceCoeffs([0.5, 0.1, 0.002, -0.0001]);
        let reflected = coeffs.reflected();

        let left = solve(
            &opt,
            &[0.0, 0.0, 0.0, 20.0, coeffs.eval(0.0), -coeffs.desired_heading(0.0)],
            &coeffs.0,
        );
        let right = solve(
            &opt,
            &[0.0, 0.0, 0.0, 20.0, reflected.eval(0.0), -reflected.desired_heading(0.0)],
            &reflected.0,
        );

        let l = left.first_actuation();
        let r = right.first_actuation();

        assert!(l.steer_rad.abs() > 1e-2);
        assert_relative_eq!(l.steer_rad, -r.steer_rad, epsilon = 1e-3);
        assert_relative_eq!(l.accel, r.accel, epsilon = 1e-3);
    }

    #[test]
    fn test_cte_weight_monotonic() {
        let sum_cte_sq = |cte_weight: f64| {
            let mut params = reference_params();
            params.weights.cte = cte_weight;
            let opt = optimizer(params);

            let sol = solve(&opt, &[0.0, 0.0, 0.0, 20.0, 2.0, 0.0], &[2.0, 0.0, 0.0, 0.0]);

            sol.states().iter().map(|s| s.cte_m * s.cte_m).sum::<f64>()
        };

        let light = sum_cte_sq(100.0);
        let heavy = sum_cte_sq(5000.0);

        assert!(heavy <= light + 1e-6, "heavy {} light {}", heavy, light);
    }

    #[test]
    fn test_deterministic() {
        let opt = optimizer(reference_params());
        let state = [0.0, 0.0, 0.05, 18.0, 1.0, -0.05];
        let coeffs = [1.0, 0.05, 0.001, 0.0];

        let a = solve(&opt, &state, &coeffs);
        let b = solve(&opt, &state, &coeffs);

        assert_eq!(a.vars(), b.vars());
    }

    #[test]
    fn test_input_shape() {
        let opt = optimizer(reference_params());

        match opt.solve(&[0.0; 5], &[0.0; 4], None) {
            Err(MpcCtrlError::InputShape { input, expected: 6, found: 5 }) => {
                assert_eq!(input, "vehicle state")
            }
            r => panic!("Expected a state shape error, got {:?}", r),
        }

        match opt.solve(&[0.0; 6], &[0.0; 3], None) {
            Err(MpcCtrlError::InputShape { expected: 4, found: 3, .. }) => (),
            r => panic!("Expected a coefficient shape error, got {:?}", r),
        }

        match opt.solve(&[0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0], &[0.0; 4], None) {
            Err(MpcCtrlError::NonFiniteInput) => (),
            r => panic!("Expected a non-finite input error, got {:?}", r),
        }
    }

    #[test]
    fn test_rejects_invalid_params() {
        let mut params = reference_params();
        params.timestep_s = 0.0;

        assert!(TrajectoryOptimizer::new(params.clone(), PanocSolver::new(params.solver)).is_err());
    }

    #[test]
    fn test_failure_carries_best() {
        let params = reference_params();

        // Not converged
        let opt = TrajectoryOptimizer::new(
            params.clone(),
            EchoSolver { converged: false, offset: 0.0 },
        )
        .unwrap();

        match opt.solve(&[0.0, 0.0, 0.0, 10.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], None) {
            Err(MpcCtrlError::OptimizationFailure { best, .. }) => {
                assert!(!best.converged);
                assert!(best.max_violation < 1e-9);
            }
            r => panic!("Expected an optimization failure, got {:?}", r),
        }

        // Converged but off the dynamics
        let opt = TrajectoryOptimizer::new(
            params,
            EchoSolver { converged: true, offset: 0.5 },
        )
        .unwrap();

        match opt.solve(&[0.0, 0.0, 0.0, 10.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], None) {
            Err(MpcCtrlError::OptimizationFailure { best, .. }) => {
                assert!(best.max_violation > 0.1);
                // Still pinned after projection
                assert_eq!(best.state(0).to_array(), [0.0, 0.0, 0.0, 10.0, 1.0, 0.0]);
            }
            r => panic!("Expected an optimization failure, got {:?}", r),
        }
    }

    #[test]
    fn test_non_finite_solution_kept() {
        // A diverged solver must not be turned into full lock and full brake
        let opt = TrajectoryOptimizer::new(
            reference_params(),
            EchoSolver { converged: true, offset: f64::NAN },
        )
        .unwrap();

        match opt.solve(&[0.0, 0.0, 0.0, 10.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], None) {
            Err(MpcCtrlError::OptimizationFailure { reason, best }) => {
                assert_eq!(reason, "solution is not finite");
                assert!(!best.converged);
                assert!(!best.first_actuation().steer_rad.is_finite());
                assert!(!best.first_actuation().accel.is_finite());
                assert!(best.max_violation.is_nan());
            }
            r => panic!("Expected an optimization failure, got {:?}", r),
        }
    }

    #[test]
    fn test_initial_guess() {
        let params = reference_params();
        let layout = Layout::new(params.horizon_len);
        let state = VehicleState::from_slice(&[0.0, 0.0, 0.0, 10.0, 1.0, 0.1]).unwrap();
        let coeffs = ReferenceCoeffs([1.0, 0.05, 0.0, 0.0]);
        let problem = TrackingProblem::new(&params, layout, &state, coeffs);

        // Cold
        let cold = initial_guess(&params, layout, &state, &coeffs, None);
        assert_relative_eq!(problem.max_violation(&cold), 0.0, epsilon = 1e-12);
        assert!(cold[layout.actuation_range(0).start..].iter().all(|u| *u == 0.0));

        // Warm, shifted by one with the last repeated, clamped to the limits
        let mut warm = vec![Actuation::default(); layout.num_transitions()];
        for (i, a) in warm.iter_mut().enumerate() {
            a.steer_rad = 0.01 * i as f64;
            a.accel = 0.1;
        }
        warm[2].accel = 5.0;

        let vars = initial_guess(&params, layout, &state, &coeffs, Some(&warm));
        assert_relative_eq!(problem.max_violation(&vars), 0.0, epsilon = 1e-12);
        assert_relative_eq!(layout.actuation(&vars, 0).steer_rad, 0.01);
        assert_relative_eq!(layout.actuation(&vars, 1).accel, ACCEL_LIMIT);
        let last = layout.num_transitions() - 1;
        assert_relative_eq!(layout.actuation(&vars, last).steer_rad, 0.01 * last as f64);
    }

    /// Arbitrary actuations within the limits, with the states filled in.
    fn filled(problem: &TrackingProblem, layout: Layout) -> Vec<f64> {
        let mut z = vec![0.0; layout.num_vars()];
        for t in 0..layout.num_transitions() {
            let act = Actuation {
                steer_rad: 0.05 * ((t * 7 % 5) as f64) - 0.1,
                accel: 0.3 * ((t * 3 % 4) as f64) - 0.4,
            };
            layout.set_actuation(&mut z, t, &act);
        }
        problem.fill_dependent(&mut z);
        z
    }

    #[test]
    fn test_fill_dependent() {
        let params = reference_params();
        let layout = Layout::new(5);
        let state = VehicleState::from_slice(&[0.3, -0.2, 0.15, 8.0, 0.7, -0.1]).unwrap();
        let coeffs = ReferenceCoeffs([0.5, 0.2, -0.03, 0.001]);
        let problem = TrackingProblem::new(&params, layout, &state, coeffs);

        assert_eq!(problem.free_vars(), layout.actuation_offset(0)..layout.num_vars());

        let z = filled(&problem, layout);

        assert_eq!(layout.state(&z, 0), state);
        assert_eq!(problem.max_violation(&z), 0.0);
        assert_relative_eq!(layout.actuation(&z, 2).steer_rad, 0.1);
    }

    #[test]
    fn test_reduced_gradient_matches_finite_difference() {
        let params = reference_params();
        let layout = Layout::new(4);
        let state = VehicleState::from_slice(&[0.3, -0.2, 0.15, 8.0, 0.7, -0.1]).unwrap();
        let coeffs = ReferenceCoeffs([0.5, 0.2, -0.03, 0.001]);
        let problem = TrackingProblem::new(&params, layout, &state, coeffs);

        let free = problem.free_vars();
        let z = filled(&problem, layout);

        let mut analytic = vec![0.0; free.len()];
        problem.reduced_gradient(&z, &mut analytic);

        // Cost of the trajectory rolled out from perturbed actuations
        let rolled_cost = |i: usize, h: f64| {
            let mut zp = z.clone();
            zp[free.start + i] += h;
            problem.fill_dependent(&mut zp);
            problem.cost(&zp)
        };

        let h = 1e-6;
        for i in 0..free.len() {
            let numeric = (rolled_cost(i, h) - rolled_cost(i, -h)) / (2.0 * h);
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-4, max_relative = 1e-5);
        }
    }
}
