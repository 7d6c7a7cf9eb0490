//! Logging setup
//!
//! Every line goes to stdout and to the session's log file, prefixed with the
//! session elapsed time and a coloured level tag:
//!
//! ```text
//! [  1.234567 INF] MpcCtrl init complete
//! [  1.301220 DBG] mpc_lib::mpc_ctrl::optimizer: Solve: cost 12.3 ...
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use std::env;
use std::str::FromStr;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable which, if set, overrides the requested log level.
pub const LOG_LEVEL_ENV_VAR: &str = "MPC_LOG_LEVEL";

/// Level for the solver engine's own logging, which is very chatty below
/// `Warn`.
const SOLVER_LEVEL: LevelFilter = LevelFilter::Warn;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The log level must include `INFO`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Cannot parse the MPC_LOG_LEVEL value `{0}` as a log level")]
    InvalidEnvLevel(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` is used unless `MPC_LOG_LEVEL` is set, and must be at least
/// `Info`. Must only be called once.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    let level = level_from_env(min_level)?;

    if level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            let elapsed = session::get_elapsed_seconds();
            let tag = level_tag(record.level());

            if record.level() > Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}", elapsed, tag, record.target(), message
                ))
            }
            else {
                out.finish(format_args!("[{:10.6} {}] {}", elapsed, tag, message))
            }
        })
        .level(level)
        .level_for("optimization_engine", SOLVER_LEVEL.min(level))
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

/// The log level requested through `MPC_LOG_LEVEL`, or `default` if it is not
/// set.
pub fn level_from_env(default: LevelFilter) -> Result<LevelFilter, LoggerInitError> {
    match env::var(LOG_LEVEL_ENV_VAR) {
        Ok(s) => parse_level(&s),
        Err(_) => Ok(default)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_level(s: &str) -> Result<LevelFilter, LoggerInitError> {
    LevelFilter::from_str(s.trim())
        .map_err(|_| LoggerInitError::InvalidEnvLevel(s.to_string()))
}

/// Three letter coloured tag for a level.
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info  => "INF".normal(),
        Level::Warn  => "WRN".yellow(),
        Level::Error => "ERR".red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
