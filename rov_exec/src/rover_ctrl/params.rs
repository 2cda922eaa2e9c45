//! Safety parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use comms_if::eqpt::gnss::FixQuality;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Thresholds the position solution must meet for the rover to drive safely.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Minimum number of satellites in the solution
    pub min_satellites: u32,

    /// Maximum horizontal dilution of precision
    pub max_hdop: f64,

    /// Minimum fix quality, given as the GGA quality code
    pub min_rtk_quality: Option<FixQuality>,

    /// Require an RTK solution, only used if `min_rtk_quality` isn't given
    pub require_rtk: bool,

    /// If true losing the minimum fix quality while moving is an emergency
    pub rtk_loss_stop_enabled: bool,

    /// Time without a position update before the watchdog emergency stops
    pub max_connection_loss_s: f64,

    /// Period at which the watchdog checks the connection
    pub watchdog_check_period_s: f64,

    /// If true the rover holds still while the position fails the safety
    /// thresholds, otherwise it only logs the failure
    pub pause_on_degraded_fix: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_satellites: 6,
            max_hdop: 5.0,
            min_rtk_quality: Some(FixQuality::RtkFloat),
            require_rtk: false,
            rtk_loss_stop_enabled: true,
            max_connection_loss_s: 30.0,
            watchdog_check_period_s: 1.0,
            pause_on_degraded_fix: false,
        }
    }
}
