//! Utility library for the rover software
//!
//! Shared plumbing used by every crate in the workspace: the session and
//! logger setup, parameter file loading, and the maths and geodesy helpers
//! used by navigation.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod geo;
pub mod host;
pub mod logger;
pub mod maths;
pub mod params;
pub mod session;
pub mod time;
