//! # Mission descriptor
//!
//! A mission is an ordered list of GPS waypoints, uploaded as JSON:
//!
//! ```json
//! {
//!     "id": "field_a",
//!     "name": "Field A row 1",
//!     "waypoints": [
//!         {"lat": 50.93401, "lon": -1.39502, "action": "forward", "speed_ms": 0.3},
//!         {"lat": 50.93412, "lon": -1.39502, "action": "spray", "duration_s": 2.0}
//!     ]
//! }
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target speed used when a waypoint doesn't specify one.
pub const DEFAULT_SPEED_MS: f64 = 0.3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A mission as uploaded by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDescriptor {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub waypoints: Vec<WaypointRecord>,
}

/// A single waypoint entry of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointRecord {
    pub lat: f64,
    pub lon: f64,

    #[serde(default)]
    pub action: WaypointAction,

    #[serde(default = "default_speed_ms")]
    pub speed_ms: f64,

    /// Duration of the action at the waypoint, zero for none
    #[serde(default)]
    pub duration_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Action to perform at a waypoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointAction {
    Forward,
    Spray,

    /// Action tags this software doesn't know about
    #[serde(other)]
    Unknown,
}

/// Errors that can occur while loading a mission file.
#[derive(Debug, Error)]
pub enum MissionLoadError {
    #[error("Cannot load the mission file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the mission file: {0}")]
    DeserialiseError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MissionDescriptor {
    /// Load a mission from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MissionLoadError> {
        let mission_str = read_to_string(path).map_err(MissionLoadError::FileLoadError)?;

        Self::from_json(&mission_str)
    }

    /// Parse a mission from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, MissionLoadError> {
        serde_json::from_str(json_str).map_err(MissionLoadError::DeserialiseError)
    }
}

impl Default for WaypointAction {
    fn default() -> Self {
        WaypointAction::Forward
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_speed_ms() -> f64 {
    DEFAULT_SPEED_MS
}
