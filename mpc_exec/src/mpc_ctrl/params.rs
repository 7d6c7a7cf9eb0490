//! MPC control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::{CostWeights, MpcCtrlError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control.
///
/// These form the horizon configuration, which is fixed for the lifetime of
/// the controller.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Params {

    // ---- HORIZON ----

    /// Number of predicted steps, N.
    pub horizon_len: usize,

    /// Duration of one predicted step.
    ///
    /// Units: seconds
    pub timestep_s: f64,

    // ---- VEHICLE ----

    /// Distance between the front axle and the centre of gravity.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Maximum absolute steering angle.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Polarity of the normalised steering output.
    #[serde(default)]
    pub steer_polarity: SteerPolarity,

    // ---- TRACKING ----

    /// Speed the controller tries to hold.
    ///
    /// Units: meters/second
    pub ref_speed_ms: f64,

    /// Seed each solve with the previous tick's actuation sequence.
    #[serde(default)]
    pub warm_start: bool,

    /// Cost function weights
    pub weights: CostWeights,

    /// Nonlinear solver settings
    #[serde(default)]
    pub solver: SolverParams,
}

/// Settings for the nonlinear solver.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SolverParams {
    /// Tolerance on the scaled fixed-point residual.
    pub optimality_tolerance: f64,

    /// Largest absolute dynamics residual accepted in a returned solution.
    pub feasibility_tolerance: f64,

    /// Number of L-BFGS memory pairs.
    pub lbfgs_memory: usize,

    /// Maximum number of iterations.
    pub max_iterations: usize,

    /// Wall-clock budget for one solve.
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which direction a positive normalised steering command turns the vehicle.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SteerPolarity {
    /// Positive commands turn the heading clockwise, the same sense as the
    /// model's steering angle.
    ClockwisePositive,

    /// Positive commands turn the heading counter-clockwise.
    CounterClockwisePositive,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SteerPolarity {
    fn default() -> Self {
        SteerPolarity::ClockwisePositive
    }
}

impl SteerPolarity {
    /// Sign applied to the model's steering angle to get the output command.
    pub fn sign(&self) -> f64 {
        match self {
            SteerPolarity::ClockwisePositive => 1.0,
            SteerPolarity::CounterClockwisePositive => -1.0,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            optimality_tolerance: 1e-3,
            feasibility_tolerance: 1e-3,
            lbfgs_memory: 10,
            max_iterations: 500,
            max_solve_time_s: 0.05,
        }
    }
}

impl Params {
    /// Check that the parameters describe a physical configuration.
    pub fn validate(&self) -> Result<(), MpcCtrlError> {
        if self.horizon_len < 2 {
            return Err(config_err("horizon_len", "must be at least 2"));
        }
        if !(self.timestep_s.is_finite() && self.timestep_s > 0.0) {
            return Err(config_err("timestep_s", "must be finite and positive"));
        }
        if !(self.lf_m.is_finite() && self.lf_m > 0.0) {
            return Err(config_err("lf_m", "must be finite and positive"));
        }
        if !(self.max_steer_rad.is_finite()
            && self.max_steer_rad > 0.0
            && self.max_steer_rad < std::f64::consts::FRAC_PI_2)
        {
            return Err(config_err("max_steer_rad", "must be in (0, pi/2)"));
        }
        if !self.ref_speed_ms.is_finite() {
            return Err(config_err("ref_speed_ms", "must be finite"));
        }

        for (name, w) in self.weights.named().iter() {
            if !(w.is_finite() && *w >= 0.0) {
                return Err(config_err(name, "weights must be finite and non-negative"));
            }
        }

        self.solver.validate()
    }
}

impl SolverParams {
    /// Check the solver settings are usable.
    pub fn validate(&self) -> Result<(), MpcCtrlError> {
        let positive = [
            ("solver.optimality_tolerance", self.optimality_tolerance),
            ("solver.feasibility_tolerance", self.feasibility_tolerance),
            ("solver.max_solve_time_s", self.max_solve_time_s),
        ];

        for (name, v) in positive.iter() {
            if !(v.is_finite() && *v > 0.0) {
                return Err(config_err(name, "must be finite and positive"));
            }
        }

        if self.lbfgs_memory == 0 {
            return Err(config_err("solver.lbfgs_memory", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(config_err("solver.max_iterations", "must be at least 1"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn config_err(field: &str, reason: &str) -> MpcCtrlError {
    MpcCtrlError::Configuration(format!("{} {}", field, reason))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// The reference configuration: N = 10, dt = 0.1 s, Lf = 2.67 m,
    /// 25 degrees of steering and a 40 m/s reference speed.
    pub(crate) fn reference_params() -> Params {
        Params {
            horizon_len: 10,
            timestep_s: 0.1,
            lf_m: 2.67,
            max_steer_rad: 25f64.to_radians(),
            steer_polarity: SteerPolarity::ClockwisePositive,
            ref_speed_ms: 40.0,
            warm_start: false,
            weights: CostWeights {
                cte: 2000.0,
                epsi: 2000.0,
                speed: 1.0,
                steer: 5.0,
                accel: 5.0,
                steer_rate: 200.0,
                accel_rate: 10.0,
            },
            solver: SolverParams {
                optimality_tolerance: 1e-5,
                max_iterations: 2000,
                max_solve_time_s: 5.0,
                ..SolverParams::default()
            },
        }
    }

    #[test]
    fn test_reference_params_valid() {
        assert!(reference_params().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_physical() {
        let cases: Vec<Box<dyn Fn(&mut Params)>> = vec![
            Box::new(|p: &mut Params| p.horizon_len = 1),
            Box::new(|p: &mut Params| p.timestep_s = 0.0),
            Box::new(|p: &mut Params| p.timestep_s = -0.1),
            Box::new(|p: &mut Params| p.timestep_s = f64::NAN),
            Box::new(|p: &mut Params| p.lf_m = 0.0),
            Box::new(|p: &mut Params| p.max_steer_rad = 0.0),
            Box::new(|p: &mut Params| p.max_steer_rad = -0.4),
            Box::new(|p: &mut Params| p.ref_speed_ms = f64::INFINITY),
            Box::new(|p: &mut Params| p.weights.cte = -1.0),
            Box::new(|p: &mut Params| p.solver.lbfgs_memory = 0),
            Box::new(|p: &mut Params| p.solver.max_iterations = 0),
            Box::new(|p: &mut Params| p.solver.max_solve_time_s = 0.0),
        ];

        for modify in cases.iter() {
            let mut p = reference_params();
            modify(&mut p);

            match p.validate() {
                Err(MpcCtrlError::Configuration(_)) => (),
                r => panic!("Expected a configuration error for {:?}, got {:?}", p, r),
            }
        }
    }

    #[test]
    fn test_load_from_toml() {
        let p: Params = util::params::from_str(
            r#"
            horizon_len = 10
            timestep_s = 0.1
            lf_m = 2.67
            max_steer_rad = 0.4363323129985824
            ref_speed_ms = 40.0
            steer_polarity = "counter_clockwise_positive"

            [weights]
            cte = 2000.0
            epsi = 2000.0
            speed = 1.0
            steer = 5.0
            accel = 5.0
            steer_rate = 200.0
            accel_rate = 10.0

            [solver]
            max_solve_time_s = 0.1
            "#,
        )
        .unwrap();

        assert_eq!(p.horizon_len, 10);
        assert_eq!(p.steer_polarity, SteerPolarity::CounterClockwisePositive);
        assert!(!p.warm_start);
        assert_eq!(p.solver.max_solve_time_s, 0.1);
        assert_eq!(p.solver.lbfgs_memory, SolverParams::default().lbfgs_memory);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_shipped_params() {
        let p: Params =
            util::params::from_str(include_str!("../../../params/mpc_ctrl.toml")).unwrap();

        assert!(p.validate().is_ok());
        assert_eq!(p.solver, SolverParams::default());

        // The simulator steers left for positive commands
        assert_eq!(p.steer_polarity, SteerPolarity::CounterClockwisePositive);
    }
}
