//! Cyclic module interface
//!
//! A cyclic module is initialised once from a parameter file and then called
//! every control cycle with that cycle's input, returning its output and a
//! status report for archiving.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The state of a cyclic module.
pub trait State {
    /// Short name of the module, used for its archive directory and in logs.
    const NAME: &'static str;

    /// Data required during initialisation, usually a parameter file path.
    type InitData;
    /// Error raised if initialisation fails.
    type InitError;

    /// Per-cycle input.
    type InputData;
    /// Per-cycle output.
    type OutputData;
    /// Per-cycle status, kept flat so it can be archived as a csv row.
    type StatusReport;
    /// Error raised if a cycle fails.
    type ProcError;

    /// Initialise the module, creating any archives under the session's
    /// archive root in a directory named after `NAME`.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Process one cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
