//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod tc;

/// Telemetry reports
pub mod tm;

/// Command and response definitions for equipment (like the motor controller)
pub mod eqpt;
