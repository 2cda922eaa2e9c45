//! # Mission module
//!
//! Holds the sequence of waypoints the rover is executing and its progress
//! through them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use serde::Serialize;
use thiserror::Error;

use comms_if::tc::mission::{MissionDescriptor, WaypointAction};
use util::geo::LatLon;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single target position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Waypoint {
    pub position: LatLon,
    pub action: WaypointAction,

    /// Base driving speed towards this waypoint
    pub speed_ms: f64,

    /// Duration of the waypoint's action, if it has one
    pub duration_s: Option<f64>,
}

/// An ordered list of waypoints and the index of the current one.
///
/// The index only ever increases, reaching the length of the sequence once
/// every waypoint has been reached.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WaypointSequence {
    id: String,
    name: String,
    waypoints: Vec<Waypoint>,
    index: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a mission can be refused.
#[derive(Debug, Error, PartialEq)]
pub enum MissionError {
    #[error("The mission contains no waypoints")]
    Empty,

    #[error("Waypoint {0} has an invalid position ({1}, {2})")]
    InvalidPosition(usize, f64, f64),

    #[error("Waypoint {0} has an invalid speed ({1} m/s)")]
    InvalidSpeed(usize, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WaypointSequence {
    /// Build a new sequence from an uploaded mission.
    pub fn from_descriptor(mission: &MissionDescriptor) -> Result<Self, MissionError> {
        if mission.waypoints.is_empty() {
            return Err(MissionError::Empty);
        }

        let mut waypoints = Vec::with_capacity(mission.waypoints.len());

        for (i, wp) in mission.waypoints.iter().enumerate() {
            if !wp.lat.is_finite()
                || !wp.lon.is_finite()
                || wp.lat.abs() > 90.0
                || wp.lon.abs() > 180.0
            {
                return Err(MissionError::InvalidPosition(i, wp.lat, wp.lon));
            }

            if !wp.speed_ms.is_finite() || wp.speed_ms <= 0.0 {
                return Err(MissionError::InvalidSpeed(i, wp.speed_ms));
            }

            waypoints.push(Waypoint {
                position: LatLon::new(wp.lat, wp.lon),
                action: wp.action,
                speed_ms: wp.speed_ms,
                duration_s: if wp.duration_s > 0.0 {
                    Some(wp.duration_s)
                } else {
                    None
                },
            });
        }

        info!(
            "Mission \"{}\" ({}) loaded with {} waypoints",
            mission.name,
            mission.id,
            waypoints.len()
        );

        Ok(Self {
            id: mission.id.clone(),
            name: mission.name.clone(),
            waypoints,
            index: 0,
        })
    }

    /// The waypoint currently being driven to, `None` once complete.
    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.index)
    }

    /// Move on to the next waypoint. Returns true if there is one.
    pub fn advance(&mut self) -> bool {
        if self.index < self.waypoints.len() {
            self.index += 1;
        }

        self.index < self.waypoints.len()
    }

    /// (current index, total number of waypoints)
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.waypoints.len())
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.waypoints.len()
    }

    pub fn has_waypoints(&self) -> bool {
        !self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::mission::WaypointRecord;

    fn mission(n: usize) -> MissionDescriptor {
        MissionDescriptor {
            id: "test".into(),
            name: "Test".into(),
            waypoints: (0..n)
                .map(|i| WaypointRecord {
                    lat: 50.0 + i as f64 * 1e-5,
                    lon: -1.0,
                    action: WaypointAction::Forward,
                    speed_ms: 0.3,
                    duration_s: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_advance_through_sequence() {
        let mut seq = WaypointSequence::from_descriptor(&mission(3)).unwrap();

        assert_eq!(seq.progress(), (0, 3));
        assert_eq!(seq.current().unwrap().position.lat_deg, 50.0);
        assert_eq!(seq.current().unwrap().duration_s, None);

        assert!(seq.advance());
        assert!(seq.advance());
        assert_eq!(seq.progress(), (2, 3));
        assert!(!seq.is_complete());

        // Advancing from the last waypoint completes the sequence
        assert!(!seq.advance());
        assert!(seq.is_complete());
        assert!(seq.current().is_none());
        assert_eq!(seq.progress(), (3, 3));

        // Index never passes the length
        assert!(!seq.advance());
        assert_eq!(seq.progress(), (3, 3));
    }

    #[test]
    fn test_index_monotonic() {
        let mut seq = WaypointSequence::from_descriptor(&mission(5)).unwrap();
        let mut last = seq.progress().0;

        for _ in 0..10 {
            seq.advance();
            let (idx, total) = seq.progress();
            assert!(idx >= last);
            assert!(idx <= total);
            last = idx;
        }
    }

    #[test]
    fn test_reject_invalid_missions() {
        assert_eq!(
            WaypointSequence::from_descriptor(&mission(0)).unwrap_err(),
            MissionError::Empty
        );

        let mut m = mission(2);
        m.waypoints[1].lat = 91.0;
        assert!(matches!(
            WaypointSequence::from_descriptor(&m),
            Err(MissionError::InvalidPosition(1, _, _))
        ));

        let mut m = mission(2);
        m.waypoints[0].speed_ms = 0.0;
        assert!(matches!(
            WaypointSequence::from_descriptor(&m),
            Err(MissionError::InvalidSpeed(0, _))
        ));
    }

    #[test]
    fn test_default_is_empty() {
        let seq = WaypointSequence::default();
        assert!(!seq.has_waypoints());
        assert!(seq.current().is_none());
        assert_eq!(seq.progress(), (0, 0));
    }
}
