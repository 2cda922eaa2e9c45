//! # GNSS receiver interface
//!
//! Parsing and formatting of the NMEA 0183 sentences produced by the RTK
//! receiver (`GGA` fix data, `RMC` speed over ground) and by heading sensors
//! (`HDT` true heading). Any talker ID is accepted (`$GP`, `$GN`, ...).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum number of comma separated fields in a GGA sentence.
pub const GGA_MIN_FIELDS: usize = 15;

/// Minimum number of comma separated fields in an RMC sentence.
pub const RMC_MIN_FIELDS: usize = 8;

/// Minimum number of comma separated fields in an HDT sentence.
pub const HDT_MIN_FIELDS: usize = 2;

/// HDOP reported when the receiver leaves the field empty.
pub const HDOP_UNKNOWN: f64 = 99.9;

/// Kilometers per hour in one knot.
pub const KMH_PER_KNOT: f64 = 1.852;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fix data from a GGA sentence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GgaFix {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub alt_m: f64,
    pub fix_quality: FixQuality,
    pub num_satellites: u32,
    pub hdop: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// GGA fix quality indicator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FixQuality {
    Invalid,
    Gps,
    Dgps,
    Pps,
    RtkFixed,
    RtkFloat,
    Estimated,
}

/// A supported NMEA sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum NmeaSentence {
    /// Position fix
    Gga(GgaFix),

    /// Speed over ground in km/h
    Rmc { speed_kmh: f64 },

    /// True heading in degrees
    Hdt { heading_deg: f64 },
}

/// Errors raised while parsing NMEA sentences.
#[derive(Debug, Error, PartialEq)]
pub enum NmeaError {
    #[error("Line is not an NMEA sentence: {0:?}")]
    NotNmea(String),

    #[error("Unsupported sentence type {0}")]
    Unsupported(String),

    #[error("{kind} sentence has {found} fields, expected at least {expected}")]
    TooShort {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value {value:?} in field {field}")]
    InvalidField { field: usize, value: String },

    #[error("Checksum mismatch (expected {expected:02X}, found {found:02X})")]
    ChecksumMismatch { expected: u8, found: u8 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FixQuality {
    /// The NMEA code of this fix quality.
    pub fn code(self) -> u8 {
        match self {
            FixQuality::Invalid => 0,
            FixQuality::Gps => 1,
            FixQuality::Dgps => 2,
            FixQuality::Pps => 3,
            FixQuality::RtkFixed => 4,
            FixQuality::RtkFloat => 5,
            FixQuality::Estimated => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FixQuality::Invalid),
            1 => Some(FixQuality::Gps),
            2 => Some(FixQuality::Dgps),
            3 => Some(FixQuality::Pps),
            4 => Some(FixQuality::RtkFixed),
            5 => Some(FixQuality::RtkFloat),
            6 => Some(FixQuality::Estimated),
            _ => None,
        }
    }

    /// Human readable name of the fix quality.
    pub fn label(self) -> &'static str {
        match self {
            FixQuality::Invalid => "Invalid",
            FixQuality::Gps => "GPS",
            FixQuality::Dgps => "DGPS",
            FixQuality::Pps => "PPS",
            FixQuality::RtkFixed => "RTK Fixed",
            FixQuality::RtkFloat => "RTK Float",
            FixQuality::Estimated => "Estimated",
        }
    }

    /// True for either RTK solution.
    pub fn is_rtk(self) -> bool {
        matches!(self, FixQuality::RtkFixed | FixQuality::RtkFloat)
    }

    /// Ordering of fix qualities by positional precision.
    ///
    /// The NMEA codes are not ordered by precision (RTK Float is 5, RTK
    /// Fixed is 4, dead reckoning is 6), so thresholds compare this rank.
    pub fn precision_rank(self) -> u8 {
        match self {
            FixQuality::Invalid => 0,
            FixQuality::Estimated => 1,
            FixQuality::Gps => 2,
            FixQuality::Dgps | FixQuality::Pps => 3,
            FixQuality::RtkFloat => 4,
            FixQuality::RtkFixed => 5,
        }
    }

    /// True if this fix is at least as precise as `min`.
    pub fn meets(self, min: FixQuality) -> bool {
        self.precision_rank() >= min.precision_rank()
    }
}

impl Default for FixQuality {
    fn default() -> Self {
        FixQuality::Invalid
    }
}

impl fmt::Display for FixQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl TryFrom<u8> for FixQuality {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        FixQuality::from_code(code).ok_or_else(|| format!("{} is not a valid fix quality code", code))
    }
}

impl From<FixQuality> for u8 {
    fn from(q: FixQuality) -> u8 {
        q.code()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a single NMEA line.
///
/// If the sentence carries a `*hh` checksum it is verified. Trailing
/// whitespace and line endings are ignored.
pub fn parse_sentence(line: &str) -> Result<NmeaSentence, NmeaError> {
    let line = line.trim();

    if !line.starts_with('$') || line.len() < 6 {
        return Err(NmeaError::NotNmea(line.to_string()));
    }

    // Split off and check the checksum
    let body = match line.find('*') {
        Some(idx) => {
            let body = &line[1..idx];
            let cs_str = &line[idx + 1..];
            let found = u8::from_str_radix(cs_str, 16).map_err(|_| NmeaError::InvalidField {
                field: 0,
                value: cs_str.to_string(),
            })?;
            let expected = checksum(body);
            if expected != found {
                return Err(NmeaError::ChecksumMismatch { expected, found });
            }
            body
        }
        None => &line[1..],
    };

    let fields: Vec<&str> = body.split(',').collect();

    // Sentence type follows the two character talker ID
    let kind = fields[0].get(2..).unwrap_or("");

    match kind {
        "GGA" => parse_gga(&fields).map(NmeaSentence::Gga),
        "RMC" => parse_rmc(&fields),
        "HDT" => parse_hdt(&fields),
        _ => Err(NmeaError::Unsupported(fields[0].to_string())),
    }
}

/// XOR checksum of the characters between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Format a GGA sentence for the given fix, including its checksum.
pub fn format_gga(talker: &str, fix: &GgaFix) -> String {
    let (lat, lat_hemi) = format_dm(fix.lat_deg, 2, 'N', 'S');
    let (lon, lon_hemi) = format_dm(fix.lon_deg, 3, 'E', 'W');

    let body = format!(
        "{}GGA,000000.00,{},{},{},{},{},{:02},{:.1},{:.3},M,0.0,M,,",
        talker,
        lat,
        lat_hemi,
        lon,
        lon_hemi,
        fix.fix_quality.code(),
        fix.num_satellites,
        fix.hdop,
        fix.alt_m
    );

    with_checksum(&body)
}

/// Format an RMC sentence reporting the given ground speed.
pub fn format_rmc(talker: &str, lat_deg: f64, lon_deg: f64, speed_kmh: f64) -> String {
    let (lat, lat_hemi) = format_dm(lat_deg, 2, 'N', 'S');
    let (lon, lon_hemi) = format_dm(lon_deg, 3, 'E', 'W');

    let body = format!(
        "{}RMC,000000.00,A,{},{},{},{},{:.3},,010100,,,R",
        talker,
        lat,
        lat_hemi,
        lon,
        lon_hemi,
        speed_kmh / KMH_PER_KNOT
    );

    with_checksum(&body)
}

/// Format an HDT sentence for the given true heading.
pub fn format_hdt(talker: &str, heading_deg: f64) -> String {
    with_checksum(&format!("{}HDT,{:.2},T", talker, heading_deg))
}

/// Convert an NMEA `[d]ddmm.mmmm` coordinate and hemisphere into signed
/// decimal degrees.
pub fn dm_to_decimal(value: &str, hemisphere: &str) -> Option<f64> {
    // Byte offsets below are only char boundaries for ASCII input
    if !value.is_ascii() {
        return None;
    }

    let dot = value.find('.').unwrap_or_else(|| value.len());
    if dot < 2 {
        return None;
    }

    let deg: f64 = if dot == 2 {
        0.0
    } else {
        value[..dot - 2].parse().ok()?
    };
    let min: f64 = value[dot - 2..].parse().ok()?;

    if !(0.0..60.0).contains(&min) {
        return None;
    }

    let decimal = deg + min / 60.0;

    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_gga(fields: &[&str]) -> Result<GgaFix, NmeaError> {
    if fields.len() < GGA_MIN_FIELDS {
        return Err(NmeaError::TooShort {
            kind: "GGA",
            expected: GGA_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let quality_code: u8 = parse_or(fields, 6, 0)?;
    let fix_quality = FixQuality::from_code(quality_code).ok_or_else(|| invalid(fields, 6))?;
    let num_satellites: u32 = parse_or(fields, 7, 0)?;
    let hdop: f64 = parse_or(fields, 8, HDOP_UNKNOWN)?;

    // An empty position is reported as 0, 0 like the receiver does before it
    // has a fix
    let lat_deg = if fields[2].is_empty() {
        0.0
    } else {
        dm_to_decimal(fields[2], fields[3]).ok_or_else(|| invalid(fields, 2))?
    };
    let lon_deg = if fields[4].is_empty() {
        0.0
    } else {
        dm_to_decimal(fields[4], fields[5]).ok_or_else(|| invalid(fields, 4))?
    };

    let alt_m: f64 = parse_or(fields, 9, 0.0)?;

    Ok(GgaFix {
        lat_deg,
        lon_deg,
        alt_m,
        fix_quality,
        num_satellites,
        hdop,
    })
}

fn parse_rmc(fields: &[&str]) -> Result<NmeaSentence, NmeaError> {
    if fields.len() < RMC_MIN_FIELDS {
        return Err(NmeaError::TooShort {
            kind: "RMC",
            expected: RMC_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let knots: f64 = parse_or(fields, 7, 0.0)?;

    Ok(NmeaSentence::Rmc {
        speed_kmh: knots * KMH_PER_KNOT,
    })
}

fn parse_hdt(fields: &[&str]) -> Result<NmeaSentence, NmeaError> {
    if fields.len() < HDT_MIN_FIELDS || fields[1].is_empty() {
        return Err(NmeaError::TooShort {
            kind: "HDT",
            expected: HDT_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let heading_deg: f64 = fields[1].parse().map_err(|_| invalid(fields, 1))?;

    Ok(NmeaSentence::Hdt { heading_deg })
}

/// Parse a field, using `default` if the field is empty.
fn parse_or<T: std::str::FromStr>(fields: &[&str], idx: usize, default: T) -> Result<T, NmeaError> {
    let field = fields[idx];
    if field.is_empty() {
        Ok(default)
    } else {
        field.parse().map_err(|_| invalid(fields, idx))
    }
}

fn invalid(fields: &[&str], idx: usize) -> NmeaError {
    NmeaError::InvalidField {
        field: idx,
        value: fields[idx].to_string(),
    }
}

/// Format decimal degrees as `[d]ddmm.mmmmmmm` with the hemisphere letter.
fn format_dm(value_deg: f64, deg_width: usize, pos: char, neg: char) -> (String, char) {
    let hemi = if value_deg < 0.0 { neg } else { pos };
    let abs = value_deg.abs();

    let mut deg = abs.trunc();
    let mut min = (abs - deg) * 60.0;

    // Minutes rounding up to 60 in the printed precision carry into degrees
    if min >= 59.999_999_95 {
        deg += 1.0;
        min = 0.0;
    }

    (
        format!("{:0width$}{:010.7}", deg as u32, min, width = deg_width),
        hemi,
    )
}

fn with_checksum(body: &str) -> String {
    format!("${}*{:02X}", body, checksum(body))
}

#[cfg(test)]
mod test {
    use super::*;

    const GGA: &str = "$GNGGA,123519.00,4807.0380000,N,01131.0000000,E,4,12,0.8,545.4,M,46.9,M,,";

    #[test]
    fn test_parse_gga() {
        let fix = match parse_sentence(GGA).unwrap() {
            NmeaSentence::Gga(f) => f,
            s => panic!("Expected GGA, got {:?}", s),
        };

        assert!((fix.lat_deg - (48.0 + 7.038 / 60.0)).abs() < 1e-9);
        assert!((fix.lon_deg - (11.0 + 31.0 / 60.0)).abs() < 1e-9);
        assert_eq!(fix.fix_quality, FixQuality::RtkFixed);
        assert_eq!(fix.num_satellites, 12);
        assert_eq!(fix.hdop, 0.8);
        assert_eq!(fix.alt_m, 545.4);
    }

    #[test]
    fn test_parse_gga_southern_western() {
        let line = "$GPGGA,000000.00,3351.5000000,S,15112.0000000,W,5,9,1.2,10.0,M,0.0,M,,";
        match parse_sentence(line).unwrap() {
            NmeaSentence::Gga(f) => {
                assert!((f.lat_deg + (33.0 + 51.5 / 60.0)).abs() < 1e-9);
                assert!((f.lon_deg + (151.0 + 12.0 / 60.0)).abs() < 1e-9);
                assert_eq!(f.fix_quality, FixQuality::RtkFloat);
            }
            s => panic!("Expected GGA, got {:?}", s),
        }
    }

    #[test]
    fn test_parse_gga_empty_fields() {
        let line = "$GNGGA,,,,,,0,,,,M,,M,,";
        match parse_sentence(line).unwrap() {
            NmeaSentence::Gga(f) => {
                assert_eq!(f.fix_quality, FixQuality::Invalid);
                assert_eq!(f.num_satellites, 0);
                assert_eq!(f.hdop, HDOP_UNKNOWN);
                assert_eq!(f.lat_deg, 0.0);
                assert_eq!(f.lon_deg, 0.0);
            }
            s => panic!("Expected GGA, got {:?}", s),
        }
    }

    #[test]
    fn test_reject_short_and_malformed() {
        assert!(matches!(
            parse_sentence("$GNGGA,123519.00,4807.038,N"),
            Err(NmeaError::TooShort { kind: "GGA", .. })
        ));
        assert!(matches!(
            parse_sentence("$GNRMC,1,A,2"),
            Err(NmeaError::TooShort { kind: "RMC", .. })
        ));
        assert!(matches!(
            parse_sentence("$GNGGA,123519.00,48x7.038,N,01131.000,E,4,12,0.8,545.4,M,46.9,M,,"),
            Err(NmeaError::InvalidField { field: 2, .. })
        ));
        assert!(matches!(
            parse_sentence("$GNGGA,123519.00,4807.038,Q,01131.000,E,4,12,0.8,545.4,M,46.9,M,,"),
            Err(NmeaError::InvalidField { field: 2, .. })
        ));
        assert!(matches!(
            parse_sentence("$GNGSV,3,1,11"),
            Err(NmeaError::Unsupported(_))
        ));
        assert!(matches!(parse_sentence("garbage"), Err(NmeaError::NotNmea(_))));
    }

    #[test]
    fn test_reject_non_ascii_coordinates() {
        // Line noise decoded as replacement characters, no checksum to catch it
        assert!(matches!(
            parse_sentence("$GPGGA,123519,\u{fffd}1.5,N,01131.000,E,4,12,0.9,545.4,M,46.9,M,,"),
            Err(NmeaError::InvalidField { field: 2, .. })
        ));
        assert!(matches!(
            parse_sentence("$GPGGA,123519,4807.038,N,011\u{fffd}1.000,E,4,12,0.9,545.4,M,46.9,M,,"),
            Err(NmeaError::InvalidField { field: 4, .. })
        ));

        assert_eq!(dm_to_decimal("48\u{e9}7.038", "N"), None);
        assert_eq!(dm_to_decimal("\u{fffd}", "N"), None);
    }

    #[test]
    fn test_checksum_verified() {
        let line = format_hdt("GN", 123.45);
        assert_eq!(
            parse_sentence(&line).unwrap(),
            NmeaSentence::Hdt { heading_deg: 123.45 }
        );

        // Corrupt the body but keep the old checksum
        let corrupt = line.replace("123.45", "133.45");
        assert!(matches!(
            parse_sentence(&corrupt),
            Err(NmeaError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rmc_speed() {
        let line = "$GNRMC,123519.00,A,4807.038,N,01131.000,E,10.0,84.4,230394,,,R";
        match parse_sentence(line).unwrap() {
            NmeaSentence::Rmc { speed_kmh } => assert!((speed_kmh - 18.52).abs() < 1e-9),
            s => panic!("Expected RMC, got {:?}", s),
        }
    }

    #[test]
    fn test_format_gga_parses_back() {
        let fix = GgaFix {
            lat_deg: -50.934_012_3,
            lon_deg: -1.395_678_9,
            alt_m: 12.5,
            fix_quality: FixQuality::RtkFixed,
            num_satellites: 14,
            hdop: 0.7,
        };

        let line = format_gga("GN", &fix);
        match parse_sentence(&line).unwrap() {
            NmeaSentence::Gga(f) => {
                assert!((f.lat_deg - fix.lat_deg).abs() < 1e-8);
                assert!((f.lon_deg - fix.lon_deg).abs() < 1e-8);
                assert_eq!(f.fix_quality, fix.fix_quality);
                assert_eq!(f.num_satellites, 14);
            }
            s => panic!("Expected GGA, got {:?}", s),
        }
    }

    #[test]
    fn test_fix_quality() {
        assert_eq!(FixQuality::from_code(4), Some(FixQuality::RtkFixed));
        assert_eq!(FixQuality::from_code(9), None);
        assert_eq!(FixQuality::RtkFloat.label(), "RTK Float");
        assert!(FixQuality::RtkFloat.is_rtk());
        assert!(!FixQuality::Dgps.is_rtk());

        assert!(FixQuality::RtkFixed.meets(FixQuality::RtkFloat));
        assert!(!FixQuality::RtkFloat.meets(FixQuality::RtkFixed));
        assert!(!FixQuality::Estimated.meets(FixQuality::RtkFloat));
    }
}
