//! # Trajectory control module
//!
//! Trajectory control is responsible for getting the rover to its target
//! waypoint. It does this in two phases, commanded by the navigation state
//! machine:
//!
//! - Rotation: the rover turns on the spot until its heading is within a
//!   tolerance of the bearing to the target.
//! - Line following: the rover drives along the line segment from where it
//!   started to the target. The cross track error (perpendicular distance to
//!   the line, positive to the right) is fed to a PID controller whose output
//!   modulates the left and right wheel speeds around the base speed.
//!
//! The controller gains are scaled down as the GNSS solution degrades, since
//! a noisy position makes an aggressive controller chase the noise.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::Params;
pub use state::*;
