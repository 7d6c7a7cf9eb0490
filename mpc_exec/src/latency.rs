//! # Latency compensation
//!
//! A command computed now only acts on the vehicle after the actuation
//! latency. The controller therefore solves from where the vehicle will be
//! when the command lands, found by running the kinematic model over the
//! latency with the command currently applied.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::mpc_ctrl::{model, Actuation, ReferenceCoeffs, VehicleState};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// The vehicle-frame state of a vehicle at the origin, before compensation.
pub fn state_at_origin(speed_ms: f64, cte_m: f64, epsi_rad: f64) -> VehicleState {
    VehicleState {
        v_ms: speed_ms,
        cte_m,
        epsi_rad,
        ..VehicleState::default()
    }
}

/// Advance `state` by `latency_s` under the currently applied actuation.
///
/// `applied.steer_rad` must already be in the model's polarity.
pub fn project(
    state: &VehicleState,
    applied: &Actuation,
    coeffs: &ReferenceCoeffs,
    lf_m: f64,
    latency_s: f64,
) -> VehicleState {
    if latency_s <= 0.0 {
        return *state;
    }

    model::step(state, applied, coeffs, lf_m, latency_s)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_latency() {
        let s = state_at_origin(10.0, 1.0, -0.1);
        let coeffs = ReferenceCoeffs([1.0, 0.1, 0.0, 0.0]);
        let applied = Actuation { steer_rad: 0.2, accel: 0.5 };

        assert_eq!(project(&s, &applied, &coeffs, 2.67, 0.0), s);
    }

    #[test]
    fn test_projection() {
        let s = state_at_origin(10.0, 0.0, 0.0);
        let coeffs = ReferenceCoeffs::default();
        let applied = Actuation { steer_rad: 0.1, accel: 1.0 };

        let p = project(&s, &applied, &coeffs, 2.67, 0.1);

        assert_relative_eq!(p.x_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y_m, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.v_ms, 10.1, epsilon = 1e-12);

        // Positive steer turns clockwise
        assert_relative_eq!(p.psi_rad, -10.0 / 2.67 * 0.1 * 0.1, epsilon = 1e-12);
        assert!(p.epsi_rad < 0.0);
    }
}
