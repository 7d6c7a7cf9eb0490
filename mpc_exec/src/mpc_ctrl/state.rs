//! Implementations for the MpcCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;

// Internal
use super::{
    extract, Actuation, MpcCtrlError, MpcOutput, PanocSolver, Params, Solution,
    TrajectoryOptimizer,
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// MPC control module state
#[derive(Default)]
pub struct MpcCtrl {
    optimizer: Option<TrajectoryOptimizer<PanocSolver>>,

    /// Actuation sequence of the last successful solve, used to warm start
    /// the next one.
    prev_actuations: Option<Vec<Actuation>>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Input data to MPC control.
#[derive(Clone, Debug, Default)]
pub struct InputData {
    /// Vehicle state `[x, y, psi, v, cte, epsi]`.
    pub state: Vec<f64>,

    /// Reference polynomial coefficients, lowest power first.
    pub coeffs: Vec<f64>,
}

/// Status report for MpcCtrl processing.
///
/// Kept flat so it can be archived as a csv row.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    pub converged: bool,
    pub warm_started: bool,
    pub cost: f64,
    pub cost_cte: f64,
    pub cost_epsi: f64,
    pub cost_speed: f64,
    pub cost_steer: f64,
    pub cost_accel: f64,
    pub cost_steer_rate: f64,
    pub cost_accel_rate: f64,
    pub max_violation: f64,
    pub iterations: usize,
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcCtrl {
    /// Create a controller directly from its parameters, without archiving.
    pub fn new(params: Params) -> Result<Self, MpcCtrlError> {
        let solver = PanocSolver::new(params.solver);

        Ok(Self {
            optimizer: Some(TrajectoryOptimizer::new(params, solver)?),
            ..Self::default()
        })
    }

    /// The controller's parameters, if it has been initialised.
    pub fn params(&self) -> Option<&Params> {
        self.optimizer.as_ref().map(|o| o.params())
    }

    /// Forget the warm start, the next solve starts from a neutral guess.
    pub fn reset(&mut self) {
        self.prev_actuations = None;
    }

    fn update_report(&mut self, solution: &Solution, warm_started: bool) {
        let terms = &solution.cost_terms;

        self.report = StatusReport {
            converged: solution.converged,
            warm_started,
            cost: solution.cost,
            cost_cte: terms.cte,
            cost_epsi: terms.epsi,
            cost_speed: terms.speed,
            cost_steer: terms.steer,
            cost_accel: terms.accel,
            cost_steer_rate: terms.steer_rate,
            cost_accel_rate: terms.accel_rate,
            max_violation: solution.max_violation,
            iterations: solution.iterations,
            solve_time_s: solution.solve_time_s,
        };
    }
}

impl State for MpcCtrl {
    const NAME: &'static str = "mpc_ctrl";

    type InitData = &'static str;
    type InitError = MpcCtrlError;

    type InputData = InputData;
    type OutputData = MpcOutput;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data)
            .map_err(MpcCtrlError::ParamLoad)?;

        *self = Self::new(params)?;

        self.arch_report = Archiver::from_path(
            session, format!("{}/status_report.csv", Self::NAME)
        ).map_err(MpcCtrlError::Archive)?;

        debug!("{} initialised", Self::NAME);

        Ok(())
    }

    /// Perform cyclic processing of MPC control.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let optimizer = match self.optimizer {
            Some(ref o) => o,
            None => return Err(MpcCtrlError::NotInitialised),
        };

        let warm = if optimizer.params().warm_start {
            self.prev_actuations.as_deref()
        }
        else {
            None
        };
        let warm_started = warm.is_some();

        let result = optimizer.solve(&input_data.state, &input_data.coeffs, warm);

        match result {
            Ok(solution) => {
                let output = extract(&solution, optimizer.params())?;
                self.prev_actuations = Some(solution.actuations());
                self.update_report(&solution, warm_started);

                trace!("MpcCtrl report: {:?}", self.report);

                Ok((output, self.report))
            }
            Err(e) => {
                // A failed solve is no basis for the next one
                if let MpcCtrlError::OptimizationFailure { ref best, .. } = e {
                    self.update_report(best, warm_started);
                }
                self.prev_actuations = None;

                debug!("MpcCtrl solve failed, warm start cleared");

                Err(e)
            }
        }
    }
}

impl Archived for MpcCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
