//! # Telemetry module
//!
//! Status and telemetry reports produced by the rover for the operator.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::eqpt::{gnss::FixQuality, motor::MotorStatus};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Short status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTm {
    pub state: NavState,
    pub operational: bool,
    pub mission_id: String,
    pub mission_paused: bool,
    pub waypoint_index: usize,
    pub waypoint_total: usize,
    pub position: Option<PositionTm>,
    pub heading_deg: Option<f64>,
    pub gnss: GnssTm,
    pub error: Option<String>,
}

/// Full telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryTm {
    pub timestamp: DateTime<Utc>,
    pub state: NavState,
    pub position: Option<PositionTm>,
    pub heading_deg: Option<f64>,
    pub waypoint_index: usize,
    pub waypoint_total: usize,
    pub gnss: GnssTm,
    pub motors: MotorStatus,
    pub cross_track_error_m: f64,
    pub max_cross_track_error_m: f64,
    pub error: Option<String>,
}

/// Filtered and raw position of the rover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionTm {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub raw_lat_deg: f64,
    pub raw_lon_deg: f64,
}

/// Receiver fix information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnssTm {
    pub fix_quality: FixQuality,
    pub fix_label: String,
    pub num_satellites: u32,
    pub hdop: f64,
    pub speed_kmh: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// States of the navigation state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavState {
    Idle,
    Rotating,
    Driving,
    ReachedWaypoint,
    MissionComplete,
    Error,
    EmergencyStop,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavState {
    pub fn as_str(self) -> &'static str {
        match self {
            NavState::Idle => "IDLE",
            NavState::Rotating => "ROTATING",
            NavState::Driving => "DRIVING",
            NavState::ReachedWaypoint => "REACHED_WAYPOINT",
            NavState::MissionComplete => "MISSION_COMPLETE",
            NavState::Error => "ERROR",
            NavState::EmergencyStop => "EMERGENCY_STOP",
        }
    }

    /// True in the states where the rover is commanding motion.
    pub fn is_moving(self) -> bool {
        matches!(self, NavState::Rotating | NavState::Driving)
    }
}

impl Default for NavState {
    fn default() -> Self {
        NavState::Idle
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
