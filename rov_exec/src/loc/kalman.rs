//! # Position filter
//!
//! Constant velocity Kalman filter over the state `[lat, lon, vel_lat,
//! vel_lon]` (degrees and degrees per second), measuring position only.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::Serialize;

use util::geo::LatLon;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Variance of the uninitialised prior.
const PRIOR_VARIANCE: f64 = 1000.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kalman filter smoothing the receiver's position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionFilter {
    /// State estimate `[lat, lon, vel_lat, vel_lon]`
    x: Vector4<f64>,

    /// State covariance
    p: Matrix4<f64>,

    /// Process noise covariance
    q: Matrix4<f64>,

    /// Default measurement noise covariance
    r: Matrix2<f64>,

    /// Measurement model, picks the position out of the state
    h: Matrix2x4<f64>,

    initialized: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PositionFilter {
    /// Create a new filter with the given process and measurement noise
    /// variances.
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            x: Vector4::zeros(),
            p: Matrix4::identity() * PRIOR_VARIANCE,
            q: Matrix4::identity() * process_noise,
            r: Matrix2::identity() * measurement_noise,
            h: Matrix2x4::new(
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
            ),
            initialized: false,
        }
    }

    /// Propagate the state forward by `dt_s` seconds.
    ///
    /// Does nothing until the filter has been seeded by a measurement.
    pub fn predict(&mut self, dt_s: f64) {
        if !self.initialized {
            return;
        }

        let f = Self::transition(dt_s);

        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + self.q;
    }

    /// Correct the state with a position measurement.
    ///
    /// The first measurement seeds the state with zero velocity. If
    /// `noise_override` is given it replaces the default measurement noise
    /// variance for this update only.
    pub fn update(&mut self, measurement: &LatLon, noise_override: Option<f64>) {
        let z = Vector2::new(measurement.lat_deg, measurement.lon_deg);

        if !self.initialized {
            self.x = Vector4::new(z[0], z[1], 0.0, 0.0);
            self.initialized = true;
            return;
        }

        let r = match noise_override {
            Some(n) => Matrix2::identity() * n,
            None => self.r,
        };

        // Innovation and its covariance
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + r;

        let s_inv = match s.try_inverse() {
            Some(i) => i,
            None => {
                warn!("Position filter innovation covariance is singular, skipping update");
                return;
            }
        };

        let k = self.p * self.h.transpose() * s_inv;

        self.x += k * y;
        self.p = (Matrix4::identity() - k * self.h) * self.p;
    }

    /// Current filtered position, or `None` before the first measurement.
    pub fn get_position(&self) -> Option<LatLon> {
        if self.initialized {
            Some(LatLon::new(self.x[0], self.x[1]))
        } else {
            None
        }
    }

    /// Current velocity estimate in degrees per second (lat, lon).
    pub fn get_velocity(&self) -> (f64, f64) {
        (self.x[2], self.x[3])
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Trace of the state covariance, a scalar measure of uncertainty.
    pub fn covariance_trace(&self) -> f64 {
        self.p.trace()
    }

    /// Return to the uninitialised, high uncertainty prior.
    pub fn reset(&mut self) {
        self.x = Vector4::zeros();
        self.p = Matrix4::identity() * PRIOR_VARIANCE;
        self.initialized = false;
    }

    fn transition(dt_s: f64) -> Matrix4<f64> {
        Matrix4::new(
            1.0, 0.0, dt_s, 0.0,
            0.0, 1.0, 0.0, dt_s,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_update_seeds_state() {
        let mut f = PositionFilter::new(0.001, 0.5);
        assert!(!f.is_initialized());
        assert_eq!(f.get_position(), None);

        // Predict before initialisation is a no-op
        f.predict(1.0);
        assert_eq!(f.covariance_trace(), 4.0 * PRIOR_VARIANCE);

        f.update(&LatLon::new(50.1, -1.2), None);
        assert!(f.is_initialized());
        assert_eq!(f.get_position(), Some(LatLon::new(50.1, -1.2)));
        assert_eq!(f.get_velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_converges_to_constant_position() {
        let truth = LatLon::new(50.934, -1.395);
        let mut f = PositionFilter::new(0.001, 0.5);

        f.update(&LatLon::new(truth.lat_deg + 0.002, truth.lon_deg - 0.002), None);
        f.predict(0.1);
        let trace_start = f.covariance_trace();

        let mut trace_prev = trace_start;
        for i in 0..200 {
            // Deterministic zero mean noise
            let noise = if i % 2 == 0 { 1e-5 } else { -1e-5 };
            f.predict(0.1);
            f.update(
                &LatLon::new(truth.lat_deg + noise, truth.lon_deg - noise),
                Some(0.01),
            );

            if i < 5 {
                assert!(f.covariance_trace() < trace_prev);
            }
            trace_prev = f.covariance_trace();
        }

        let pos = f.get_position().unwrap();
        assert!((pos.lat_deg - truth.lat_deg).abs() < 1e-4);
        assert!((pos.lon_deg - truth.lon_deg).abs() < 1e-4);
        assert!(f.covariance_trace() < trace_start);
    }

    #[test]
    fn test_reset_restores_prior() {
        let mut f = PositionFilter::new(0.001, 0.5);
        f.update(&LatLon::new(1.0, 2.0), None);
        f.predict(0.1);
        f.update(&LatLon::new(1.0, 2.0), None);

        f.reset();
        assert!(!f.is_initialized());
        assert_eq!(f.get_position(), None);
        assert_eq!(f.covariance_trace(), 4.0 * PRIOR_VARIANCE);
    }
}
