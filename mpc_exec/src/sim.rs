//! # Simulated plant
//!
//! A kinematic vehicle following a waypoint track, standing in for the real
//! simulator. Commands reach the plant after the declared actuation latency
//! and the plant reports telemetry in the same form the simulator does.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::collections::VecDeque;

// Internal
use crate::{
    mpc_ctrl::{Params, NUM_COEFFS},
    params::SimParams,
    telemetry::Telemetry,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global pose and speed of the simulated vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x_m: f64,
    pub y_m: f64,
    pub psi_rad: f64,
    pub v_ms: f64,
}

/// A command waiting for the latency to pass.
#[derive(Debug, Clone, Copy)]
struct PendingCmd {
    apply_at_s: f64,
    steer: f64,
    throttle: f64,
}

/// The simulated plant.
pub struct Sim {
    params: SimParams,

    lf_m: f64,
    max_steer_rad: f64,
    polarity: f64,
    latency_s: f64,

    pose: Pose,
    time_s: f64,

    /// Normalised steer and throttle currently acting on the plant.
    applied: (f64, f64),
    pending: VecDeque<PendingCmd>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur in the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("The track x ({0}) and y ({1}) lists have different lengths")]
    MismatchedTrack(usize, usize),

    #[error("The track needs at least 4 waypoints, found {0}")]
    TrackTooShort(usize),

    #[error("Invalid simulation parameter: {0}")]
    InvalidParam(&'static str),

    #[error("The vehicle has reached the end of the track")]
    EndOfTrack,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Sim {
    /// Place a vehicle at the start of the track.
    ///
    /// The plant uses the controller's vehicle geometry and steering
    /// convention, so a perfect model match is simulated.
    pub fn new(params: SimParams, ctrl_params: &Params, latency_s: f64) -> Result<Self, SimError> {
        let n = params.track_x_m.len();

        if n != params.track_y_m.len() {
            return Err(SimError::MismatchedTrack(n, params.track_y_m.len()));
        }
        if n < NUM_COEFFS {
            return Err(SimError::TrackTooShort(n));
        }
        if !(params.plant_dt_s.is_finite() && params.plant_dt_s > 0.0) {
            return Err(SimError::InvalidParam("plant_dt_s"));
        }
        if !(latency_s.is_finite() && latency_s >= 0.0) {
            return Err(SimError::InvalidParam("actuation_latency_s"));
        }

        // Offset perpendicular to the first segment
        let dx = params.track_x_m[1] - params.track_x_m[0];
        let dy = params.track_y_m[1] - params.track_y_m[0];
        let seg_heading = dy.atan2(dx);

        let pose = Pose {
            x_m: params.track_x_m[0] - params.initial_offset_m * seg_heading.sin(),
            y_m: params.track_y_m[0] + params.initial_offset_m * seg_heading.cos(),
            psi_rad: params.initial_psi_rad,
            v_ms: params.initial_speed_ms,
        };

        Ok(Self {
            params,
            lf_m: ctrl_params.lf_m,
            max_steer_rad: ctrl_params.max_steer_rad,
            polarity: ctrl_params.steer_polarity.sign(),
            latency_s,
            pose,
            time_s: 0.0,
            applied: (0.0, 0.0),
            pending: VecDeque::new(),
        })
    }

    /// Current pose of the vehicle.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Simulated time since the start.
    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// Telemetry with up to `num_waypoints` track points starting at the one
    /// nearest the vehicle.
    pub fn telemetry(&self, num_waypoints: usize) -> Result<Telemetry, SimError> {
        let start = self.nearest_waypoint();
        let end = (start + num_waypoints).min(self.params.track_x_m.len());

        if end - start < NUM_COEFFS {
            return Err(SimError::EndOfTrack);
        }

        Ok(Telemetry {
            ptsx: self.params.track_x_m[start..end].to_vec(),
            ptsy: self.params.track_y_m[start..end].to_vec(),
            x: self.pose.x_m,
            y: self.pose.y_m,
            psi: self.pose.psi_rad,
            speed: self.pose.v_ms,
            steering_angle: self.applied.0 * self.max_steer_rad,
            throttle: self.applied.1,
        })
    }

    /// Send a normalised command, it acts after the latency.
    pub fn command(&mut self, steer: f64, throttle: f64) {
        self.pending.push_back(PendingCmd {
            apply_at_s: self.time_s + self.latency_s,
            steer: steer.max(-1.0).min(1.0),
            throttle: throttle.max(-1.0).min(1.0),
        });
    }

    /// Advance the plant by `duration_s`.
    pub fn advance(&mut self, duration_s: f64) {
        let end_s = self.time_s + duration_s;

        while self.time_s < end_s - 1e-12 {
            let dt = self.params.plant_dt_s.min(end_s - self.time_s);

            while let Some(cmd) = self.pending.front() {
                if cmd.apply_at_s > self.time_s + 1e-12 {
                    break;
                }
                self.applied = (cmd.steer, cmd.throttle);
                self.pending.pop_front();
            }

            let steer_rad = self.polarity * self.applied.0 * self.max_steer_rad;
            let accel = self.applied.1 * self.params.accel_gain_mss;
            let (sin_psi, cos_psi) = self.pose.psi_rad.sin_cos();

            self.pose = Pose {
                x_m: self.pose.x_m + self.pose.v_ms * cos_psi * dt,
                y_m: self.pose.y_m + self.pose.v_ms * sin_psi * dt,
                psi_rad: self.pose.psi_rad - self.pose.v_ms / self.lf_m * steer_rad * dt,
                v_ms: (self.pose.v_ms + accel * dt).max(0.0),
            };
            self.time_s += dt;
        }

        trace!("Sim pose at {:.2} s: {:?}", self.time_s, self.pose);
    }

    /// Distance from the vehicle to the track polyline.
    pub fn cross_track_error(&self) -> f64 {
        let xs = &self.params.track_x_m;
        let ys = &self.params.track_y_m;
        let (px, py) = (self.pose.x_m, self.pose.y_m);

        (0..xs.len() - 1)
            .map(|i| {
                let (ax, ay) = (xs[i], ys[i]);
                let (dx, dy) = (xs[i + 1] - ax, ys[i + 1] - ay);
                let len_sq = dx * dx + dy * dy;

                let t = if len_sq > 0.0 {
                    (((px - ax) * dx + (py - ay) * dy) / len_sq).max(0.0).min(1.0)
                }
                else {
                    0.0
                };

                let (cx, cy) = (ax + t * dx, ay + t * dy);
                ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
            })
            .fold(std::f64::INFINITY, f64::min)
    }

    fn nearest_waypoint(&self) -> usize {
        let dist_sq = |i: usize| {
            (self.params.track_x_m[i] - self.pose.x_m).powi(2)
                + (self.params.track_y_m[i] - self.pose.y_m).powi(2)
        };

        (0..self.params.track_x_m.len())
            .fold(0, |best, i| if dist_sq(i) < dist_sq(best) { i } else { best })
    }
}

/// A gently winding track along +x, `num_points` waypoints `spacing_m` apart.
pub fn winding_track(num_points: usize, spacing_m: f64, amplitude_m: f64) -> (Vec<f64>, Vec<f64>) {
    let xs: Vec<f64> = (0..num_points).map(|i| i as f64 * spacing_m).collect();
    let ys = xs.iter().map(|x| amplitude_m * (x / 60.0).sin()).collect();

    (xs, ys)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::params::test::reference_params;
    use approx::assert_relative_eq;

    fn sim_params() -> SimParams {
        let (track_x_m, track_y_m) = winding_track(10, 10.0, 0.0);

        SimParams {
            num_cycles: 10,
            plant_dt_s: 0.01,
            track_x_m,
            track_y_m,
            initial_offset_m: 1.0,
            initial_psi_rad: 0.0,
            initial_speed_ms: 10.0,
            accel_gain_mss: 1.0,
        }
    }

    #[test]
    fn test_new() {
        let sim = Sim::new(sim_params(), &reference_params(), 0.1).unwrap();

        assert_relative_eq!(sim.pose().y_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sim.cross_track_error(), 1.0, epsilon = 1e-12);

        let mut short = sim_params();
        short.track_x_m.truncate(3);
        short.track_y_m.truncate(3);
        assert!(matches!(
            Sim::new(short, &reference_params(), 0.1),
            Err(SimError::TrackTooShort(3))
        ));
    }

    #[test]
    fn test_latency() {
        let mut sim = Sim::new(sim_params(), &reference_params(), 0.1).unwrap();

        sim.command(0.0, 1.0);

        // Not applied before the latency has passed
        sim.advance(0.1);
        assert_relative_eq!(sim.pose().v_ms, 10.0, epsilon = 1e-9);
        assert_relative_eq!(sim.pose().x_m, 1.0, epsilon = 1e-9);

        sim.advance(0.1);
        assert_relative_eq!(sim.pose().v_ms, 10.1, epsilon = 1e-9);
        assert_relative_eq!(sim.time_s(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_steer_direction() {
        let mut sim = Sim::new(sim_params(), &reference_params(), 0.0).unwrap();

        // Positive steer turns clockwise with the default polarity
        sim.command(0.5, 0.0);
        sim.advance(0.5);
        assert!(sim.pose().psi_rad < 0.0);
        assert!(sim.telemetry(6).unwrap().steering_angle > 0.0);
    }

    #[test]
    fn test_telemetry_window() {
        let mut sim = Sim::new(sim_params(), &reference_params(), 0.0).unwrap();

        let t = sim.telemetry(6).unwrap();
        assert_eq!(t.ptsx, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);

        // Drive past most of the track
        sim.advance(7.0);
        assert!(matches!(sim.telemetry(6), Err(SimError::EndOfTrack)));
    }
}
