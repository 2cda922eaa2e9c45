//! # Motor client parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use comms_if::eqpt::motor::DEFAULT_ADDRESS;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive hardware description
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Packet serial address of the motor controller
    pub address: u8,

    /// Drive wheel diameter
    pub wheel_diameter_m: f64,

    /// Distance between the left and right wheels
    pub wheelbase_m: f64,

    /// Wheel speed at full duty
    pub max_rpm: f64,
}

impl Params {
    /// Linear wheel speed at full duty.
    pub fn max_velocity_ms(&self) -> f64 {
        (self.max_rpm / 60.0) * std::f64::consts::PI * self.wheel_diameter_m
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            wheel_diameter_m: 0.079,
            wheelbase_m: 0.40,
            max_rpm: 60.0,
        }
    }
}
