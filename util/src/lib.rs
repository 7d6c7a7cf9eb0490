//! Utility library for the MPC steering software
//!
//! Shared plumbing for the executables: sessions, logging, parameter loading,
//! csv archives and polynomial maths.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod archive;
pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod session;
pub mod time;
