//! # Telemetry codec
//!
//! The simulator talks socket-io text events. An event frame is `42` followed
//! by a JSON array `[name, payload]`:
//!
//! ```text
//! 42["telemetry",{"ptsx":[..],"ptsy":[..],"x":..,"y":..,"psi":..,"speed":..,
//!                 "steering_angle":..,"throttle":..}]
//! 42["steer",{"steering_angle":..,"throttle":..,"mpc_x":[..],"mpc_y":[..],
//!             "next_x":[..],"next_y":[..]}]
//! 42["manual",{}]
//! ```
//!
//! A `42` frame without a payload (`null`) means the simulator is in manual
//! mode.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix of a socket-io event message.
const EVENT_PREFIX: &str = "42";

/// Reply requesting manual driving.
pub const MANUAL_REPLY: &str = "42[\"manual\",{}]";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Measurements sent by the simulator each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Upcoming waypoints, global x.
    pub ptsx: Vec<f64>,

    /// Upcoming waypoints, global y.
    pub ptsy: Vec<f64>,

    /// Global x position.
    pub x: f64,

    /// Global y position.
    pub y: f64,

    /// Global heading.
    ///
    /// Units: radians
    pub psi: f64,

    /// Speed, in the same units as the controller's reference speed.
    pub speed: f64,

    /// Currently applied steering angle, in the output polarity.
    ///
    /// Units: radians
    pub steering_angle: f64,

    /// Currently applied throttle.
    pub throttle: f64,
}

/// Command sent back to the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteerReply {
    /// Normalised steering demand.
    pub steering_angle: f64,

    /// Normalised throttle demand.
    pub throttle: f64,

    /// Predicted path, vehicle frame x.
    pub mpc_x: Vec<f64>,

    /// Predicted path, vehicle frame y.
    pub mpc_y: Vec<f64>,

    /// Reference waypoints, vehicle frame x.
    pub next_x: Vec<f64>,

    /// Reference waypoints, vehicle frame y.
    pub next_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A decoded simulator frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// New measurements to control on.
    Telemetry(Telemetry),

    /// The simulator is under manual control.
    Manual,

    /// Any other frame, nothing to reply.
    Ignored,
}

/// Errors which can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Could not parse the frame JSON: {0}")]
    JsonError(serde_json::Error),

    #[error("Expected the event to be a [name, payload] array")]
    MalformedEvent,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Decode one text frame from the simulator.
pub fn decode(frame: &str) -> Result<Frame, TelemetryError> {
    let body = match frame.trim().strip_prefix(EVENT_PREFIX) {
        Some(b) => b,
        None => return Ok(Frame::Ignored),
    };

    let value: Value = serde_json::from_str(body).map_err(TelemetryError::JsonError)?;

    let event = match value.as_array() {
        Some(e) if !e.is_empty() => e,
        _ => return Err(TelemetryError::MalformedEvent),
    };

    // No payload is the simulator's manual mode
    let payload = match event.get(1) {
        None | Some(Value::Null) => return Ok(Frame::Manual),
        Some(p) => p,
    };

    match event[0].as_str() {
        Some("telemetry") => Ok(Frame::Telemetry(
            serde_json::from_value(payload.clone()).map_err(TelemetryError::JsonError)?,
        )),
        Some(_) => Ok(Frame::Ignored),
        None => Err(TelemetryError::MalformedEvent),
    }
}

/// Encode a steering reply.
pub fn encode_steer(reply: &SteerReply) -> Result<String, TelemetryError> {
    let payload = serde_json::to_string(reply).map_err(TelemetryError::JsonError)?;

    Ok(format!("{}[\"steer\",{}]", EVENT_PREFIX, payload))
}

/// Encode a telemetry frame, used to record and replay runs.
pub fn encode_telemetry(telemetry: &Telemetry) -> Result<String, TelemetryError> {
    let payload = serde_json::to_string(telemetry).map_err(TelemetryError::JsonError)?;

    Ok(format!("{}[\"telemetry\",{}]", EVENT_PREFIX, payload))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
