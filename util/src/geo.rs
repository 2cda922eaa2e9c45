//! # Geodesy utilities
//!
//! Small-area geodesy on a spherical earth. Positions are WGS84 latitude and
//! longitude in decimal degrees, bearings are compass bearings in degrees
//! (0 = north, clockwise positive).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::maths::wrap_360_deg;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Flat-earth approximation of the length of one degree of latitude.
pub const METERS_PER_DEG_LAT: f64 = 111_111.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A geographic position.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LatLon {
    pub fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self { lat_deg, lon_deg }
    }

    /// Great circle distance to another position.
    pub fn distance_m(&self, other: &LatLon) -> f64 {
        haversine_distance_m(self, other)
    }

    /// Initial bearing towards another position.
    pub fn bearing_deg(&self, other: &LatLon) -> f64 {
        bearing_deg(self, other)
    }

    /// Return the position displaced by the given north and east distances.
    pub fn offset_m(&self, north_m: f64, east_m: f64) -> LatLon {
        let (dlat, dlon) = meters_to_latlon_offset(north_m, east_m, self.lat_deg);
        LatLon::new(self.lat_deg + dlat, self.lon_deg + dlon)
    }

    /// True if either coordinate is zero. Receivers report zeroed fields when
    /// they have no position, so such fixes are not trusted.
    pub fn has_zero_coordinate(&self) -> bool {
        self.lat_deg == 0.0 || self.lon_deg == 0.0
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Haversine great circle distance between two positions in meters.
pub fn haversine_distance_m(from: &LatLon, to: &LatLon) -> f64 {
    let phi_1 = from.lat_deg.to_radians();
    let phi_2 = to.lat_deg.to_radians();
    let d_phi = (to.lat_deg - from.lat_deg).to_radians();
    let d_lambda = (to.lon_deg - from.lon_deg).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi_1.cos() * phi_2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great circle bearing from one position to another, in [0, 360).
pub fn bearing_deg(from: &LatLon, to: &LatLon) -> f64 {
    let phi_1 = from.lat_deg.to_radians();
    let phi_2 = to.lat_deg.to_radians();
    let d_lambda = (to.lon_deg - from.lon_deg).to_radians();

    let x = d_lambda.sin() * phi_2.cos();
    let y = phi_1.cos() * phi_2.sin() - phi_1.sin() * phi_2.cos() * d_lambda.cos();

    wrap_360_deg(x.atan2(y).to_degrees())
}

/// Signed perpendicular distance of `position` from the line `start -> end`.
///
/// Positive when the position is to the right of the line when looking from
/// `start` towards `end`.
pub fn cross_track_error_m(position: &LatLon, start: &LatLon, end: &LatLon) -> f64 {
    let dist_start_to_pos_m = haversine_distance_m(start, position);
    let bearing_start_to_pos = bearing_deg(start, position).to_radians();
    let bearing_start_to_end = bearing_deg(start, end).to_radians();

    dist_start_to_pos_m * (bearing_start_to_pos - bearing_start_to_end).sin()
}

/// Convert a local north/east displacement in meters into a latitude and
/// longitude offset in degrees at the given reference latitude.
pub fn meters_to_latlon_offset(north_m: f64, east_m: f64, lat_ref_deg: f64) -> (f64, f64) {
    let dlat_deg = north_m / METERS_PER_DEG_LAT;
    let dlon_deg = east_m / (METERS_PER_DEG_LAT * lat_ref_deg.to_radians().cos());

    (dlat_deg, dlon_deg)
}
