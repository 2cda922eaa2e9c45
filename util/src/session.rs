//! Session management
//!
//! A session is one run of the rover executive. Starting it fixes the epoch
//! every log record is timestamped against and creates the run's directory,
//! `<root>/<sessions_dir>/<exec>_<timestamp>/`, which holds the log file.
//!
//! Only one session may be started per process.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Timestamp in session directory names, see `chrono::format::strftime`.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Session {
    /// Directory of this run
    pub session_root: PathBuf,

    /// Log file inside `session_root`
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (ROVER_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),

    #[error("A session has already been started in this process")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a session under the software root (`ROVER_SW_ROOT`).
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::new_in(&root, exec_name, sessions_dir)
    }

    /// Start a session under an explicit root directory.
    pub fn new_in(
        root: &Path,
        exec_name: &str,
        sessions_dir: &str,
    ) -> Result<Self, SessionError> {
        let epoch = start_epoch()?;

        let session_root = root
            .join(sessions_dir)
            .join(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));

        fs::create_dir_all(&session_root)
            .map_err(|e| SessionError::CannotCreateDir(session_root.clone(), e))?;

        let log_file_path = session_root.join(format!("{}.log", exec_name));

        Ok(Session {
            session_root,
            log_file_path,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds since the session started, `NAN` before it has.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

/// The session epoch, `None` before the session has started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn start_epoch() -> Result<&'static DateTime<Utc>, SessionError> {
    SESSION_EPOCH
        .try_init_once(Utc::now)
        .map_err(|_| SessionError::AlreadyStarted)?;

    SESSION_EPOCH.get().ok_or(SessionError::AlreadyStarted)
}
