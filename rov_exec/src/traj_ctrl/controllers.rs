//! # Trajectory controllers module
//!
//! This module provides the PID controller used by TrajCtrl to hold the rover
//! on its line segment, and the gain schedule applied to it as the quality of
//! the GNSS solution changes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use comms_if::eqpt::gnss::FixQuality;
use util::maths::clamp_sym;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller with a saturated output and integral anti-windup.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Symmetric limit applied to the output
    output_limit: f64,

    /// Previous error
    prev_error: f64,

    /// The integral accumulation
    integral: f64,
}

/// Snapshot of a controller's internal state.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct PidState {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
    pub output_limit: f64,
    pub integral: f64,
    pub prev_error: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Classification of the GNSS solution used to schedule the controller gains.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum GnssQualityClass {
    /// No classification has been applied yet
    Unknown,

    /// RTK fixed with HDOP below 2
    Excellent,

    /// RTK float, or RTK fixed with HDOP below 5
    Good,

    /// Any other solution with HDOP below 10
    Fair,

    /// Everything else
    Poor,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains and output limit.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, output_limit: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            output_limit: output_limit.abs(),
            integral: 0f64,
            prev_error: 0f64,
        }
    }

    /// Get the value of the controller for the given error and timestep.
    ///
    /// A non-positive `dt_s` produces no derivative and no integral
    /// contribution for this step. When the output saturates this step's
    /// integral contribution is rolled back so the integral can't wind up.
    pub fn update(&mut self, error: f64, dt_s: f64) -> f64 {
        let integral_step = if dt_s > 0.0 { error * dt_s } else { 0.0 };
        self.integral += integral_step;

        let deriv = if dt_s > 0.0 {
            (error - self.prev_error) / dt_s
        } else {
            0.0
        };

        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;
        let out_sat = clamp_sym(out, self.output_limit);

        // Anti-windup
        if out_sat.abs() >= self.output_limit {
            self.integral -= integral_step;
        }

        self.prev_error = error;

        out_sat
    }

    /// Zero the integral and previous error.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = 0f64;
    }

    /// Update any subset of the gains. The controller's state is kept.
    pub fn set_gains(&mut self, k_p: Option<f64>, k_i: Option<f64>, k_d: Option<f64>) {
        if let Some(k) = k_p {
            self.k_p = k;
        }
        if let Some(k) = k_i {
            self.k_i = k;
        }
        if let Some(k) = k_d {
            self.k_d = k;
        }
    }

    /// Current (k_p, k_i, k_d).
    pub fn gains(&self) -> (f64, f64, f64) {
        (self.k_p, self.k_i, self.k_d)
    }

    pub fn state(&self) -> PidState {
        PidState {
            k_p: self.k_p,
            k_i: self.k_i,
            k_d: self.k_d,
            output_limit: self.output_limit,
            integral: self.integral,
            prev_error: self.prev_error,
        }
    }
}

impl GnssQualityClass {
    /// Classify a GNSS solution.
    pub fn classify(fix_quality: FixQuality, hdop: f64) -> Self {
        match fix_quality {
            FixQuality::RtkFixed if hdop < 2.0 => GnssQualityClass::Excellent,
            FixQuality::RtkFixed if hdop < 5.0 => GnssQualityClass::Good,
            FixQuality::RtkFloat => GnssQualityClass::Good,
            _ if hdop < 10.0 => GnssQualityClass::Fair,
            _ => GnssQualityClass::Poor,
        }
    }

    /// Multiplier applied to the base gains in this class.
    pub fn gain_multiplier(self) -> f64 {
        match self {
            GnssQualityClass::Unknown | GnssQualityClass::Excellent => 1.0,
            GnssQualityClass::Good => 0.75,
            GnssQualityClass::Fair => 0.5,
            GnssQualityClass::Poor => 0.3,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_output_saturates() {
        let mut pid = PidController::new(2.0, 0.1, 0.5, 0.5);

        for e in [-100.0, -1.0, 0.0, 0.2, 1.0, 100.0].iter() {
            let out = pid.update(*e, 0.1);
            assert!(out.abs() <= 0.5, "out = {}", out);
        }
    }

    #[test]
    fn test_anti_windup() {
        let mut pid = PidController::new(2.0, 0.1, 0.0, 0.5);

        // Large constant error keeps the output saturated, the integral must
        // not accumulate
        for _ in 0..100 {
            assert_eq!(pid.update(10.0, 0.1), 0.5);
        }
        assert_eq!(pid.state().integral, 0.0);

        // Unsaturated steps do accumulate
        let mut pid = PidController::new(0.1, 0.1, 0.0, 0.5);
        pid.update(1.0, 0.1);
        assert!((pid.state().integral - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_dt() {
        let mut pid = PidController::new(1.0, 1.0, 1.0, 10.0);

        // No derivative or integral without a timestep
        assert_eq!(pid.update(2.0, 0.0), 2.0);
        assert_eq!(pid.update(3.0, -1.0), 3.0);
        assert_eq!(pid.state().integral, 0.0);
    }

    #[test]
    fn test_derivative_and_reset() {
        let mut pid = PidController::new(0.0, 0.0, 1.0, 100.0);

        assert!((pid.update(1.0, 0.1) - 10.0).abs() < 1e-9);
        assert!((pid.update(1.0, 0.1)).abs() < 1e-9);

        pid.reset();
        let s = pid.state();
        assert_eq!(s.integral, 0.0);
        assert_eq!(s.prev_error, 0.0);
    }

    #[test]
    fn test_set_gains_keeps_state() {
        let mut pid = PidController::new(0.1, 0.1, 0.0, 10.0);
        pid.update(1.0, 0.1);
        let integral = pid.state().integral;

        pid.set_gains(Some(1.0), None, Some(0.3));
        assert_eq!(pid.gains(), (1.0, 0.1, 0.3));
        assert_eq!(pid.state().integral, integral);
    }

    #[test]
    fn test_quality_classes() {
        use GnssQualityClass::*;

        assert_eq!(GnssQualityClass::classify(FixQuality::RtkFixed, 0.8), Excellent);
        assert_eq!(GnssQualityClass::classify(FixQuality::RtkFixed, 3.0), Good);
        assert_eq!(GnssQualityClass::classify(FixQuality::RtkFloat, 0.8), Good);
        assert_eq!(GnssQualityClass::classify(FixQuality::RtkFloat, 20.0), Good);
        assert_eq!(GnssQualityClass::classify(FixQuality::Gps, 1.0), Fair);
        assert_eq!(GnssQualityClass::classify(FixQuality::RtkFixed, 7.0), Fair);
        assert_eq!(GnssQualityClass::classify(FixQuality::Gps, 12.0), Poor);

        assert_eq!(Excellent.gain_multiplier(), 1.0);
        assert_eq!(Good.gain_multiplier(), 0.75);
        assert_eq!(Fair.gain_multiplier(), 0.5);
        assert_eq!(Poor.gain_multiplier(), 0.3);
    }
}
