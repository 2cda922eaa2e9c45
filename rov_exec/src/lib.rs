//! # Rover library.
//!
//! This library allows other crates in the workspace, and the integration
//! tests, to access items defined inside the rover crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Localisation module - provides the rover's position and heading
pub mod loc;

/// Mission module - the sequence of waypoints being executed
pub mod mission;

/// Motor client - drives the wheels through the motor controller
pub mod motor_client;

/// Navigation manager - the navigation state and its transitions
pub mod nav_mgr;

/// Rover executable parameters
pub mod params;

/// Rover control - owns the equipment and runs the control cycle
pub mod rover_ctrl;

/// Serial links to the rover's equipment
pub mod serial;

/// Simulation client - simulated equipment for running without hardware
pub mod sim_client;

/// Telecommand processor - executes operator commands
pub mod tc_processor;

/// Trajectory control module - keeps the rover on the line to its waypoint
pub mod traj_ctrl;

/// Connection watchdog - emergency stops the rover if positions stop arriving
pub mod watchdog;
