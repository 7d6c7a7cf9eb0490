//! # Tracking cost
//!
//! The objective is a sum of weighted squares over the decision trajectory:
//!
//! - tracking: `cte^2`, `epsi^2` and `(v - v_ref)^2` at every step,
//! - magnitude: `steer^2` and `accel^2` at every transition,
//! - smoothness: the squared change in steer and accel between consecutive
//!   transitions.
//!
//! The relative size of the weights trades ride quality against how
//! aggressively the path is tracked.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::layout::{
    Layout, ACCEL_OFFSET, CTE_OFFSET, EPSI_OFFSET, STEER_OFFSET, V_OFFSET,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Weights of each term in the cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Cross-track error weight
    pub cte: f64,

    /// Heading error weight
    pub epsi: f64,

    /// Reference speed tracking weight
    pub speed: f64,

    /// Steering magnitude weight
    pub steer: f64,

    /// Acceleration magnitude weight
    pub accel: f64,

    /// Steering change weight
    pub steer_rate: f64,

    /// Acceleration change weight
    pub accel_rate: f64,
}

/// The cost of a decision trajectory with its terms broken out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steer: f64,
    pub accel: f64,
    pub steer_rate: f64,
    pub accel_rate: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CostWeights {
    /// Iterate over the weights with their names.
    pub fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("speed", self.speed),
            ("steer", self.steer),
            ("accel", self.accel),
            ("steer_rate", self.steer_rate),
            ("accel_rate", self.accel_rate),
        ]
    }
}

impl CostBreakdown {
    /// Total weighted cost.
    pub fn total(&self) -> f64 {
        self.cte
            + self.epsi
            + self.speed
            + self.steer
            + self.accel
            + self.steer_rate
            + self.accel_rate
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Evaluate each weighted term of the cost.
pub fn cost_breakdown(
    layout: &Layout,
    vars: &[f64],
    weights: &CostWeights,
    ref_speed_ms: f64,
) -> CostBreakdown {
    let mut c = CostBreakdown::default();

    for t in 0..layout.horizon_len() {
        let s = layout.state_offset(t);
        c.cte += weights.cte * vars[s + CTE_OFFSET].powi(2);
        c.epsi += weights.epsi * vars[s + EPSI_OFFSET].powi(2);
        c.speed += weights.speed * (vars[s + V_OFFSET] - ref_speed_ms).powi(2);
    }

    for t in 0..layout.num_transitions() {
        let u = layout.actuation_offset(t);
        c.steer += weights.steer * vars[u + STEER_OFFSET].powi(2);
        c.accel += weights.accel * vars[u + ACCEL_OFFSET].powi(2);
    }

    for t in 1..layout.num_transitions() {
        let prev = layout.actuation_offset(t - 1);
        let curr = layout.actuation_offset(t);
        c.steer_rate += weights.steer_rate
            * (vars[curr + STEER_OFFSET] - vars[prev + STEER_OFFSET]).powi(2);
        c.accel_rate += weights.accel_rate
            * (vars[curr + ACCEL_OFFSET] - vars[prev + ACCEL_OFFSET]).powi(2);
    }

    c
}

/// Evaluate the total cost.
pub fn cost(layout: &Layout, vars: &[f64], weights: &CostWeights, ref_speed_ms: f64) -> f64 {
    cost_breakdown(layout, vars, weights, ref_speed_ms).total()
}

/// Evaluate the gradient of the cost into `grad`.
///
/// `grad` must be the same length as `vars`.
pub fn cost_gradient(
    layout: &Layout,
    vars: &[f64],
    weights: &CostWeights,
    ref_speed_ms: f64,
    grad: &mut [f64],
) {
    grad.iter_mut().for_each(|g| *g = 0.0);

    for t in 0..layout.horizon_len() {
        let s = layout.state_offset(t);
        grad[s + CTE_OFFSET] = 2.0 * weights.cte * vars[s + CTE_OFFSET];
        grad[s + EPSI_OFFSET] = 2.0 * weights.epsi * vars[s + EPSI_OFFSET];
        grad[s + V_OFFSET] = 2.0 * weights.speed * (vars[s + V_OFFSET] - ref_speed_ms);
    }

    for t in 0..layout.num_transitions() {
        let u = layout.actuation_offset(t);
        grad[u + STEER_OFFSET] += 2.0 * weights.steer * vars[u + STEER_OFFSET];
        grad[u + ACCEL_OFFSET] += 2.0 * weights.accel * vars[u + ACCEL_OFFSET];
    }

    for t in 1..layout.num_transitions() {
        let prev = layout.actuation_offset(t - 1);
        let curr = layout.actuation_offset(t);

        let d_steer = 2.0 * weights.steer_rate
            * (vars[curr + STEER_OFFSET] - vars[prev + STEER_OFFSET]);
        grad[curr + STEER_OFFSET] += d_steer;
        grad[prev + STEER_OFFSET] -= d_steer;

        let d_accel = 2.0 * weights.accel_rate
            * (vars[curr + ACCEL_OFFSET] - vars[prev + ACCEL_OFFSET]);
        grad[curr + ACCEL_OFFSET] += d_accel;
        grad[prev + ACCEL_OFFSET] -= d_accel;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn weights() -> CostWeights {
        CostWeights {
            cte: 3.0,
            epsi: 5.0,
            speed: 0.5,
            steer: 7.0,
            accel: 2.0,
            steer_rate: 11.0,
            accel_rate: 13.0,
        }
    }

    fn sample_vars(layout: &Layout) -> Vec<f64> {
        (0..layout.num_vars())
            .map(|i| ((i * 7919) % 101) as f64 / 50.0 - 1.0)
            .collect()
    }

    #[test]
    fn test_cost_terms() {
        let layout = Layout::new(3);
        let mut vars = vec![0.0; layout.num_vars()];

        // Step 1: cte 1, epsi 2, v 12
        vars[6 + CTE_OFFSET] = 1.0;
        vars[6 + EPSI_OFFSET] = 2.0;
        vars[6 + V_OFFSET] = 12.0;
        // u_0 = (0.1, 0.5), u_1 = (0.3, -0.5)
        vars[18] = 0.1;
        vars[19] = 0.5;
        vars[20] = 0.3;
        vars[21] = -0.5;

        let c = cost_breakdown(&layout, &vars, &weights(), 10.0);

        assert_relative_eq!(c.cte, 3.0, epsilon = 1e-12);
        assert_relative_eq!(c.epsi, 5.0 * 4.0, epsilon = 1e-12);
        // Steps 0 and 2 are at rest, 10 below the reference
        assert_relative_eq!(c.speed, 0.5 * (100.0 + 4.0 + 100.0), epsilon = 1e-12);
        assert_relative_eq!(c.steer, 7.0 * (0.01 + 0.09), epsilon = 1e-12);
        assert_relative_eq!(c.accel, 2.0 * (0.25 + 0.25), epsilon = 1e-12);
        assert_relative_eq!(c.steer_rate, 11.0 * 0.04, epsilon = 1e-12);
        assert_relative_eq!(c.accel_rate, 13.0 * 1.0, epsilon = 1e-12);
        assert_relative_eq!(cost(&layout, &vars, &weights(), 10.0), c.total(), epsilon = 1e-12);
    }

    #[test]
    fn test_cost_gradient_matches_finite_difference() {
        let layout = Layout::new(5);
        let vars = sample_vars(&layout);
        let mut grad = vec![0.0; layout.num_vars()];
        let h = 1e-6;

        cost_gradient(&layout, &vars, &weights(), 0.7, &mut grad);

        for i in 0..vars.len() {
            let mut plus = vars.clone();
            let mut minus = vars.clone();
            plus[i] += h;
            minus[i] -= h;
            let fd = (cost(&layout, &plus, &weights(), 0.7)
                - cost(&layout, &minus, &weights(), 0.7))
                / (2.0 * h);

            assert_relative_eq!(grad[i], fd, epsilon = 1e-5);
        }
    }
}
