//! # Equipment Interface
//!
//! This module defines the wire formats used to talk to the rover's
//! equipment: the GNSS receiver and heading sensor (NMEA text) and the motor
//! controller (binary packet serial).

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod gnss;
pub mod motor;
