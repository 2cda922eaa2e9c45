//! Localisation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the position source and its filter
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Process noise variance of the position filter
    pub process_noise: f64,

    /// Measurement noise variance used with an RTK fixed solution
    pub measurement_noise_rtk_fixed: f64,

    /// Measurement noise variance used with an RTK float solution
    pub measurement_noise_rtk_float: f64,

    /// Measurement noise variance used with any other solution, also the
    /// filter's default measurement noise
    pub measurement_noise_gps: f64,

    /// Distance of the antenna from the rotation centre along the rover's
    /// longitudinal axis, negative when mounted behind it
    pub antenna_offset_m: f64,

    /// If true navigation uses the antenna offset corrected position
    pub apply_antenna_offset: bool,

    /// Maximum number of NMEA lines processed per update
    pub max_lines_per_update: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            process_noise: 0.001,
            measurement_noise_rtk_fixed: 0.01,
            measurement_noise_rtk_float: 0.05,
            measurement_noise_gps: 0.5,
            antenna_offset_m: -0.34,
            apply_antenna_offset: true,
            max_lines_per_update: 10,
        }
    }
}
