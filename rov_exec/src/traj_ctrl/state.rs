//! Trajectory control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use serde::Serialize;

// Internal
use super::*;
use comms_if::eqpt::gnss::FixQuality;
use util::{
    geo::{bearing_deg, cross_track_error_m, haversine_distance_m, LatLon},
    maths::normalise_angle_deg,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Trajectory control, steers the rover onto and along the line towards its
/// current target waypoint.
pub struct TrajCtrl {
    params: Params,

    /// The waypoint being driven to
    target: Option<LatLon>,

    /// The ideal path to the target
    segment: Option<LineSegment>,

    /// Cross track error controller
    controller: PidController,

    /// Quality class the controller gains are currently scaled for
    quality_class: GnssQualityClass,

    /// Most recent cross track error
    cte_m: f64,

    /// Largest cross track error magnitude since the last reset
    max_cte_m: f64,

    /// True while the cross track error is above the drift alert threshold
    drift_alert: bool,
}

/// A straight line the rover should drive along.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineSegment {
    pub start: LatLon,
    pub end: LatLon,
}

/// Differential drive wheel speed demand.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WheelCmd {
    pub left_ms: f64,
    pub right_ms: f64,
}

/// The status report containing various monitoring quantities.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub target: Option<LatLon>,
    pub segment: Option<LineSegment>,

    /// The cross track error to the current line segment
    pub cte_m: f64,

    /// Peak cross track error magnitude since the last reset
    pub max_cte_m: f64,

    /// If true the cross track error exceeds the drift alert threshold
    pub drift_alert: bool,

    pub quality_class: GnssQualityClass,
    pub controller: PidState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajCtrl {
    /// Create a new instance from the parameters
    pub fn new(params: &Params) -> Self {
        Self {
            params: params.clone(),
            target: None,
            segment: None,
            controller: PidController::new(
                params.k_p,
                params.k_i,
                params.k_d,
                params.output_limit,
            ),
            quality_class: GnssQualityClass::Unknown,
            cte_m: 0.0,
            max_cte_m: 0.0,
            drift_alert: false,
        }
    }

    pub fn set_target(&mut self, target: LatLon) {
        debug!(
            "TrajCtrl target set to {:.8}, {:.8}",
            target.lat_deg, target.lon_deg
        );
        self.target = Some(target);
    }

    pub fn set_line_segment(&mut self, start: LatLon, end: LatLon) {
        self.segment = Some(LineSegment { start, end });
    }

    pub fn target(&self) -> Option<LatLon> {
        self.target
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Bearing from the given position to the target, `None` without a
    /// target.
    pub fn get_bearing_to_target(&self, position: &LatLon) -> Option<f64> {
        self.target.map(|t| bearing_deg(position, &t))
    }

    /// Distance from the given position to the target.
    pub fn get_distance_to_target(&self, position: &LatLon) -> Option<f64> {
        self.target.map(|t| haversine_distance_m(position, &t))
    }

    /// True if the heading is within the tolerance of the bearing. The
    /// configured tolerance is used if none is given.
    pub fn is_heading_aligned(
        &self,
        heading_deg: f64,
        bearing_deg: f64,
        tolerance_deg: Option<f64>,
    ) -> bool {
        let tol = tolerance_deg.unwrap_or(self.params.heading_tolerance_deg);

        normalise_angle_deg(bearing_deg - heading_deg).abs() < tol
    }

    /// Wheel speeds to rotate on the spot towards the bearing, taking the
    /// shorter direction.
    pub fn calc_rotation_cmd(&self, heading_deg: f64, bearing_deg: f64) -> WheelCmd {
        let error_deg = normalise_angle_deg(bearing_deg - heading_deg);
        let speed = self.params.rotation_speed_ms;

        trace!("Rotation heading error: {:.2} deg", error_deg);

        // Positive error turns clockwise
        if error_deg > 0.0 {
            WheelCmd {
                left_ms: speed,
                right_ms: -speed,
            }
        } else {
            WheelCmd {
                left_ms: -speed,
                right_ms: speed,
            }
        }
    }

    /// Wheel speeds to drive along the line segment at the base speed.
    ///
    /// The cross track error is positive to the right of the line, the
    /// controller output then speeds up the right wheel to turn back left.
    pub fn calc_line_following_cmd(&mut self, position: &LatLon, base_speed_ms: f64) -> WheelCmd {
        let segment = match self.segment {
            Some(s) => s,
            None => {
                warn!("No line segment set, driving straight");
                return WheelCmd {
                    left_ms: base_speed_ms,
                    right_ms: base_speed_ms,
                };
            }
        };

        let cte_m = cross_track_error_m(position, &segment.start, &segment.end);
        self.cte_m = cte_m;
        if cte_m.abs() > self.max_cte_m {
            self.max_cte_m = cte_m.abs();
        }

        // Drift alert, reported once per excursion
        if cte_m.abs() > self.params.drift_alert_threshold_m {
            if !self.drift_alert {
                warn!(
                    "Rover drifting from line: cross track error {:.2} m exceeds {:.2} m",
                    cte_m, self.params.drift_alert_threshold_m
                );
            }
            self.drift_alert = true;
        } else {
            self.drift_alert = false;
        }

        let modulation = self.controller.update(cte_m, self.params.nominal_dt_s);

        trace!(
            "Line following: CTE {:.3} m, modulation {:.3}",
            cte_m,
            modulation
        );

        WheelCmd {
            left_ms: base_speed_ms * (1.0 - modulation),
            right_ms: base_speed_ms * (1.0 + modulation),
        }
    }

    /// True if the position is within the threshold of the target. The
    /// configured threshold is used if none is given. Always false without a
    /// target.
    pub fn is_waypoint_reached(&self, position: &LatLon, threshold_m: Option<f64>) -> bool {
        let threshold_m = threshold_m.unwrap_or(self.params.waypoint_reached_threshold_m);

        match self.get_distance_to_target(position) {
            Some(d) => d < threshold_m,
            None => false,
        }
    }

    /// Scale the controller gains to the GNSS solution quality.
    ///
    /// Gains are only changed when the quality class changes.
    pub fn adapt_to_gnss_quality(&mut self, fix_quality: FixQuality, hdop: f64) {
        if !self.params.adaptive_gains {
            return;
        }

        let class = GnssQualityClass::classify(fix_quality, hdop);
        if class == self.quality_class {
            return;
        }

        let m = class.gain_multiplier();
        self.controller.set_gains(
            Some(self.params.k_p * m),
            Some(self.params.k_i * m),
            Some(self.params.k_d * m),
        );

        info!(
            "GNSS quality now {:?} ({}, HDOP {:.1}), controller gains scaled by {}",
            class, fix_quality, hdop, m
        );

        self.quality_class = class;
    }

    /// Reset the controller and the peak cross track error. Must be called on
    /// every new target.
    pub fn reset_controllers(&mut self) {
        self.controller.reset();
        self.max_cte_m = 0.0;
        self.drift_alert = false;
    }

    pub fn cross_track_error_m(&self) -> f64 {
        self.cte_m
    }

    pub fn max_cross_track_error_m(&self) -> f64 {
        self.max_cte_m
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            target: self.target,
            segment: self.segment,
            cte_m: self.cte_m,
            max_cte_m: self.max_cte_m,
            drift_alert: self.drift_alert,
            quality_class: self.quality_class,
            controller: self.controller.state(),
        }
    }
}
