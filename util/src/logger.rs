//! Generic logger utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{self, info};
use std::fmt;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// Records go to stdout with coloured level tags, and to the session's log
/// file as plain text.
///
/// # Notes
///
/// - `min_level` must be at least `log::Level::Info`, the rover must always
///   report state transitions.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    min_level: self::LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let stdout = fern::Dispatch::new()
        .format(|out, message, record| format_record(out, message, record, true))
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| format_record(out, message, record, false))
        .chain(log_file);

    fern::Dispatch::new()
        .level(min_level)
        .level_for("serialport", LevelFilter::Info)
        .chain(stdout)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

/// Map a command line verbosity count (number of `-v` flags) onto a level
/// accepted by [`logger_init`].
pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Write one record, debug and trace records also carry their target.
fn format_record(
    out: fern::FormatCallback,
    message: &fmt::Arguments,
    record: &log::Record,
    colour: bool,
) {
    let tag = if colour {
        level_to_str(record.level()).to_string()
    } else {
        level_tag(record.level()).to_string()
    };

    if record.level() > log::Level::Info {
        out.finish(format_args!(
            "[{:10.6} {}] {}: {}",
            session::get_elapsed_seconds(),
            tag,
            record.target(),
            message
        ))
    } else {
        out.finish(format_args!(
            "[{:10.6} {}] {}",
            session::get_elapsed_seconds(),
            tag,
            message
        ))
    }
}

fn level_tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Trace => "TRC",
        log::Level::Debug => "DBG",
        log::Level::Info => "INF",
        log::Level::Warn => "WRN",
        log::Level::Error => "ERR",
    }
}

/// Get the coloured representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    let tag = level_tag(level);

    match level {
        log::Level::Trace => tag.dimmed().italic(),
        log::Level::Debug => tag.dimmed(),
        log::Level::Info => tag.normal(),
        log::Level::Warn => tag.yellow(),
        log::Level::Error => tag.red().bold(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_from_verbosity() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Info);
        assert_eq!(level_from_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(2), LevelFilter::Trace);
        assert_eq!(level_from_verbosity(9), LevelFilter::Trace);

        // Every level the CLI can produce must be accepted by the logger
        for v in 0..4 {
            assert!(level_from_verbosity(v) >= log::Level::Info);
        }
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(level_tag(log::Level::Warn), "WRN");
        assert!(level_to_str(log::Level::Error).to_string().contains("ERR"));
    }
}
