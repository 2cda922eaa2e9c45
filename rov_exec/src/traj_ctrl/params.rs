//! Trajectory control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for trajectory control
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Cross track controller proportional gain
    pub k_p: f64,

    /// Cross track controller integral gain
    pub k_i: f64,

    /// Cross track controller derivative gain
    pub k_d: f64,

    /// Limit on the controller's speed modulation output
    pub output_limit: f64,

    /// Timestep the cross track controller is run at
    pub nominal_dt_s: f64,

    /// Distance within which a waypoint is considered reached
    pub waypoint_reached_threshold_m: f64,

    /// Heading error within which the rover is aligned to its target
    pub heading_tolerance_deg: f64,

    /// Wheel speed used when rotating on the spot
    pub rotation_speed_ms: f64,

    /// Cross track error above which a drift warning is raised
    pub drift_alert_threshold_m: f64,

    /// If true the controller gains are scaled with the GNSS quality
    pub adaptive_gains: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            k_p: 2.0,
            k_i: 0.1,
            k_d: 0.5,
            output_limit: 0.5,
            nominal_dt_s: 0.1,
            waypoint_reached_threshold_m: 0.3,
            heading_tolerance_deg: 5.0,
            rotation_speed_ms: 0.2,
            drift_alert_threshold_m: 1.0,
            adaptive_gains: true,
        }
    }
}
