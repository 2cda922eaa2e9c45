//! # Localisation module
//!
//! This module provides the rover's position and heading. Position comes from
//! the RTK receiver's NMEA stream, smoothed by a Kalman filter and corrected
//! for the antenna's mounting offset. Heading comes from a [`HeadingSource`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod heading;
pub mod kalman;
mod params;

pub use heading::{HeadingSource, NmeaHeading};
pub use kalman::PositionFilter;
pub use params::Params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use serde::Serialize;
use std::time::Instant;

use comms_if::eqpt::gnss::{self, FixQuality, NmeaError, NmeaSentence, HDOP_UNKNOWN};
use util::geo::{meters_to_latlon_offset, LatLon};

use crate::serial::{LineReader, SerialLink};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum number of satellites for a fix to be considered valid.
pub const MIN_VALID_FIX_SATELLITES: u32 = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The latest position information from the receiver.
#[derive(Debug, Clone, Serialize)]
pub struct PositionEstimate {
    /// Last position reported by the receiver, `None` until the first fix
    pub raw: Option<LatLon>,

    /// Filtered position, `None` until the first fix
    pub filtered: Option<LatLon>,

    pub alt_m: f64,
    pub fix_quality: FixQuality,
    pub num_satellites: u32,
    pub hdop: f64,

    /// Speed over ground
    pub speed_kmh: f64,
}

/// The RTK GNSS position source.
pub struct Gnss {
    link: Box<dyn SerialLink>,
    reader: LineReader,
    params: Params,
    estimate: PositionEstimate,
    filter: PositionFilter,

    /// Time of the last accepted position, used as the filter timestep
    last_fix_instant: Option<Instant>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PositionEstimate {
    fn default() -> Self {
        Self {
            raw: None,
            filtered: None,
            alt_m: 0.0,
            fix_quality: FixQuality::Invalid,
            num_satellites: 0,
            hdop: HDOP_UNKNOWN,
            speed_kmh: 0.0,
        }
    }
}

impl Gnss {
    /// Create a new position source reading from the given link.
    pub fn new(link: Box<dyn SerialLink>, params: &Params) -> Self {
        Self {
            link,
            reader: LineReader::new(),
            params: params.clone(),
            estimate: PositionEstimate::default(),
            filter: PositionFilter::new(params.process_noise, params.measurement_noise_gps),
            last_fix_instant: None,
        }
    }

    /// Process the sentences which have arrived since the last update.
    ///
    /// Never blocks. Returns true if at least one position was accepted.
    pub fn update(&mut self) -> bool {
        let lines = match self
            .reader
            .read_lines(self.link.as_mut(), self.params.max_lines_per_update)
        {
            Ok(l) => l,
            Err(e) => {
                debug!("GNSS read failed: {}", e);
                return false;
            }
        };

        let mut position_updated = false;

        for line in lines {
            let now = Instant::now();
            let dt_s = self
                .last_fix_instant
                .map(|t| (now - t).as_secs_f64())
                .unwrap_or(0.0);

            match self.process_sentence(&line, dt_s) {
                Ok(true) => {
                    position_updated = true;
                    self.last_fix_instant = Some(now);
                }
                Ok(false) => (),
                Err(NmeaError::Unsupported(s)) => trace!("Ignoring {} sentence", s),
                Err(e) => debug!("Rejected GNSS sentence {:?}: {}", line, e),
            }
        }

        position_updated
    }

    /// Apply a single NMEA sentence to the estimate.
    ///
    /// `dt_s` is the time since the previous accepted position, used to
    /// propagate the filter. Returns `Ok(true)` if the sentence carried a
    /// usable position. A rejected sentence leaves the estimate untouched.
    pub fn process_sentence(&mut self, line: &str, dt_s: f64) -> Result<bool, NmeaError> {
        match gnss::parse_sentence(line)? {
            NmeaSentence::Gga(fix) => {
                self.estimate.fix_quality = fix.fix_quality;
                self.estimate.num_satellites = fix.num_satellites;
                self.estimate.hdop = fix.hdop;
                self.estimate.alt_m = fix.alt_m;

                let position = LatLon::new(fix.lat_deg, fix.lon_deg);
                if position.has_zero_coordinate() {
                    return Ok(false);
                }

                self.estimate.raw = Some(position);

                self.filter.predict(dt_s);
                self.filter
                    .update(&position, Some(self.measurement_noise(fix.fix_quality)));
                self.estimate.filtered = self.filter.get_position();

                trace!(
                    "GNSS fix {:.8}, {:.8} ({}, {} sats, HDOP {:.1})",
                    position.lat_deg,
                    position.lon_deg,
                    fix.fix_quality,
                    fix.num_satellites,
                    fix.hdop
                );

                Ok(true)
            }
            NmeaSentence::Rmc { speed_kmh } => {
                self.estimate.speed_kmh = speed_kmh;
                Ok(false)
            }
            NmeaSentence::Hdt { .. } => Ok(false),
        }
    }

    /// Current position, filtered or raw. `None` before the first fix.
    ///
    /// If the filtered position is requested but the filter isn't
    /// initialised the raw position is returned.
    pub fn get_position(&self, filtered: bool) -> Option<LatLon> {
        if filtered {
            self.estimate.filtered.or(self.estimate.raw)
        } else {
            self.estimate.raw
        }
    }

    /// Position of the rover's rotation centre given its heading.
    pub fn get_position_with_offset_correction(
        &self,
        heading_deg: f64,
        filtered: bool,
    ) -> Option<LatLon> {
        self.get_position(filtered)
            .map(|p| correct_antenna_offset(&p, heading_deg, self.params.antenna_offset_m))
    }

    /// True if the fix has a non-zero quality and enough satellites.
    pub fn has_valid_fix(&self) -> bool {
        self.estimate.fix_quality != FixQuality::Invalid
            && self.estimate.num_satellites >= MIN_VALID_FIX_SATELLITES
    }

    /// True if the fix is an RTK (fixed or float) solution.
    pub fn has_rtk_fix(&self) -> bool {
        self.estimate.fix_quality.is_rtk()
    }

    pub fn fix_quality_label(&self) -> &'static str {
        self.estimate.fix_quality.label()
    }

    pub fn estimate(&self) -> &PositionEstimate {
        &self.estimate
    }

    pub fn filter(&self) -> &PositionFilter {
        &self.filter
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn measurement_noise(&self, quality: FixQuality) -> f64 {
        match quality {
            FixQuality::RtkFixed => self.params.measurement_noise_rtk_fixed,
            FixQuality::RtkFloat => self.params.measurement_noise_rtk_float,
            _ => self.params.measurement_noise_gps,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Remove the antenna mounting offset from a measured position.
///
/// The antenna sits `offset_m` along the rover's longitudinal axis (negative
/// behind the rotation centre), which points along `heading_deg`.
pub fn correct_antenna_offset(measured: &LatLon, heading_deg: f64, offset_m: f64) -> LatLon {
    let heading_rad = heading_deg.to_radians();
    let north_m = offset_m * heading_rad.cos();
    let east_m = offset_m * heading_rad.sin();

    let (dlat, dlon) = meters_to_latlon_offset(north_m, east_m, measured.lat_deg);

    LatLon::new(measured.lat_deg - dlat, measured.lon_deg - dlon)
}
