//! # Control cycle
//!
//! One tick of the controller as seen from the outside: telemetry in, reply
//! out. Glues reference preparation, latency compensation, MpcCtrl and the
//! failure policy together.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;

// Internal
use crate::{
    latency,
    mpc_ctrl::{Actuation, InputData, MpcCtrl, MpcCtrlError, StatusReport},
    params::{FailurePolicy, MpcExecParams},
    reference::{self, ReferenceError},
    telemetry::{SteerReply, Telemetry},
};
use util::{
    archive::{ArchiveError, Archived},
    module::State,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The controller with everything it needs between ticks.
pub struct MpcCycle {
    ctrl: MpcCtrl,
    exec_params: MpcExecParams,

    /// Last reply computed by a successful solve.
    last_reply: Option<SteerReply>,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    /// Reply to send to the vehicle.
    pub reply: SteerReply,

    /// MpcCtrl's report for this tick.
    pub report: StatusReport,

    /// True if the reply comes from the failure policy rather than a solve.
    pub fallback: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which stop a tick from producing a reply.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Could not prepare the reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("MpcCtrl error: {0}")]
    Ctrl(#[from] MpcCtrlError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcCycle {
    /// Wrap an initialised controller.
    pub fn new(ctrl: MpcCtrl, exec_params: MpcExecParams) -> Self {
        Self {
            ctrl,
            exec_params,
            last_reply: None,
        }
    }

    /// Access the controller.
    pub fn ctrl(&self) -> &MpcCtrl {
        &self.ctrl
    }

    /// Compute the reply to a telemetry frame.
    pub fn handle(&mut self, telemetry: &Telemetry) -> Result<CycleOutput, CycleError> {
        let (lf_m, polarity) = match self.ctrl.params() {
            Some(p) => (p.lf_m, p.steer_polarity.sign()),
            None => return Err(MpcCtrlError::NotInitialised.into()),
        };

        let reference = reference::prepare(
            &telemetry.ptsx,
            &telemetry.ptsy,
            telemetry.x,
            telemetry.y,
            telemetry.psi,
        )?;

        // The reported steering angle is in the output polarity
        let applied = Actuation {
            steer_rad: polarity * telemetry.steering_angle,
            accel: telemetry.throttle,
        };

        let state = latency::project(
            &latency::state_at_origin(telemetry.speed, reference.cte_m, reference.epsi_rad),
            &applied,
            &reference.coeffs,
            lf_m,
            self.exec_params.actuation_latency_s,
        );

        let input = InputData {
            state: state.to_array().to_vec(),
            coeffs: reference.coeffs.0.to_vec(),
        };

        let (next_x, next_y): (Vec<f64>, Vec<f64>) = reference.waypoints.iter().cloned().unzip();

        match self.ctrl.proc(&input) {
            Ok((output, report)) => {
                let (mpc_x, mpc_y) = output.predicted_path.iter().cloned().unzip();

                let reply = SteerReply {
                    steering_angle: output.steer,
                    throttle: output.throttle,
                    mpc_x,
                    mpc_y,
                    next_x,
                    next_y,
                };
                self.last_reply = Some(reply.clone());

                Ok(CycleOutput {
                    reply,
                    report,
                    fallback: false,
                })
            }
            Err(MpcCtrlError::OptimizationFailure { reason, .. }) => {
                let (steering_angle, throttle) = match (self.exec_params.failure_policy, &self.last_reply) {
                    (FailurePolicy::HoldPrevious, Some(r)) => (r.steering_angle, r.throttle),
                    _ => (0.0, -1.0),
                };

                warn!(
                    "Optimization failed ({}), applying {:?}: steer {:.3}, throttle {:.3}",
                    reason, self.exec_params.failure_policy, steering_angle, throttle
                );

                Ok(CycleOutput {
                    reply: SteerReply {
                        steering_angle,
                        throttle,
                        mpc_x: vec![],
                        mpc_y: vec![],
                        next_x,
                        next_y,
                    },
                    report: self.ctrl.report,
                    fallback: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Archived for MpcCycle {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.ctrl.write()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mpc_ctrl::params::test::reference_params,
        params::SimParams,
        sim::{winding_track, Sim},
    };

    fn exec_params(policy: FailurePolicy) -> MpcExecParams {
        let (track_x_m, track_y_m) = winding_track(60, 10.0, 4.0);

        MpcExecParams {
            cycle_period_s: 0.1,
            actuation_latency_s: 0.1,
            num_fit_waypoints: 6,
            failure_policy: policy,
            sim: SimParams {
                num_cycles: 60,
                plant_dt_s: 0.01,
                track_x_m,
                track_y_m,
                initial_offset_m: 2.0,
                initial_psi_rad: 0.0,
                initial_speed_ms: 15.0,
                accel_gain_mss: 1.0,
            },
        }
    }

    #[test]
    fn test_closed_loop_follows_track() {
        let mut params = reference_params();
        params.ref_speed_ms = 20.0;
        params.warm_start = true;

        let exec = exec_params(FailurePolicy::Brake);
        let mut sim = Sim::new(exec.sim.clone(), &params, exec.actuation_latency_s).unwrap();
        let mut cycle = MpcCycle::new(MpcCtrl::new(params).unwrap(), exec.clone());

        let initial_cte = sim.cross_track_error();
        let mut late_cte = Vec::new();

        for i in 0..exec.sim.num_cycles {
            let telemetry = sim.telemetry(exec.num_fit_waypoints).unwrap();
            let out = cycle.handle(&telemetry).unwrap();

            assert!(out.reply.steering_angle.abs() <= 1.0);
            assert!(out.reply.throttle.abs() <= 1.0);

            sim.command(out.reply.steering_angle, out.reply.throttle);
            sim.advance(exec.cycle_period_s);

            if i >= exec.sim.num_cycles / 2 {
                late_cte.push(sim.cross_track_error());
            }
        }

        let mean_late_cte = late_cte.iter().sum::<f64>() / late_cte.len() as f64;

        assert!(
            mean_late_cte < 0.5 * initial_cte,
            "initial cte {}, late mean cte {}",
            initial_cte,
            mean_late_cte
        );

        // Made progress along the track
        assert!(sim.pose().x_m > 50.0);
    }

    #[test]
    fn test_reference_error() {
        let mut cycle = MpcCycle::new(
            MpcCtrl::new(reference_params()).unwrap(),
            exec_params(FailurePolicy::Brake),
        );

        let telemetry = Telemetry {
            ptsx: vec![0.0, 1.0],
            ptsy: vec![0.0, 1.0],
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            speed: 10.0,
            steering_angle: 0.0,
            throttle: 0.0,
        };

        assert!(matches!(
            cycle.handle(&telemetry),
            Err(CycleError::Reference(ReferenceError::TooFewWaypoints(2)))
        ));
    }

    #[test]
    fn test_failure_policy() {
        // A single iteration is never enough away from the reference, so
        // every solve fails
        let mut params = reference_params();
        params.solver.max_iterations = 1;

        let telemetry = Telemetry {
            ptsx: vec![0.0, 10.0, 20.0, 30.0, 40.0],
            ptsy: vec![3.0, 4.0, 6.0, 9.0, 13.0],
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            speed: 10.0,
            steering_angle: 0.0,
            throttle: 0.0,
        };

        let mut cycle = MpcCycle::new(
            MpcCtrl::new(params).unwrap(),
            exec_params(FailurePolicy::Brake),
        );

        let out = cycle.handle(&telemetry).unwrap();
        assert!(out.fallback);
        assert_eq!(out.reply.steering_angle, 0.0);
        assert_eq!(out.reply.throttle, -1.0);
        assert_eq!(out.reply.next_x.len(), 5);
    }
}
