//! # Rover Executable Parameters
//!
//! This module provides parameters for the rover executable. They are loaded
//! once at startup from `params/rov_exec.toml` and passed to each module's
//! constructor. Every section and field has a default, so a parameter file
//! only needs to give the values which differ.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::{loc, motor_client, rover_ctrl, traj_ctrl};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RovExecParams {
    pub serial: SerialParams,
    pub hardware: motor_client::Params,
    pub loc: loc::Params,
    pub traj_ctrl: traj_ctrl::Params,
    pub safety: rover_ctrl::Params,
}

/// Serial endpoints of the rover's equipment
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SerialParams {
    /// Port of the RTK GNSS receiver
    pub gnss_port: String,
    pub gnss_baud: u32,

    /// Port of the motor controller
    pub motor_port: String,
    pub motor_baud: u32,

    /// Port of the heading sensor
    pub heading_port: String,
    pub heading_baud: u32,

    /// Timeout of a single read on any port
    pub read_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("{0} must be positive, found {1}")]
    NotPositive(&'static str, f64),

    #[error("{0} must not be negative, found {1}")]
    Negative(&'static str, f64),

    #[error("{0} must be less than {1}")]
    NotLessThan(&'static str, &'static str),

    #[error("Maximum HDOP must be at least 1, found {0}")]
    InvalidMaxHdop(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            gnss_port: "/dev/ttyACM0".into(),
            gnss_baud: 115_200,
            motor_port: "/dev/ttyS0".into(),
            motor_baud: 38_400,
            heading_port: "/dev/ttyUSB0".into(),
            heading_baud: 115_200,
            read_timeout_ms: 100,
        }
    }
}

impl SerialParams {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RovExecParams {
    /// Determines if the parameters are valid.
    ///
    /// Returns warnings for combinations which are valid but probably not
    /// intended.
    pub fn are_valid(&self) -> Result<Vec<String>, ParamsError> {
        let positive = [
            ("hardware.wheel_diameter_m", self.hardware.wheel_diameter_m),
            ("hardware.wheelbase_m", self.hardware.wheelbase_m),
            ("hardware.max_rpm", self.hardware.max_rpm),
            ("loc.process_noise", self.loc.process_noise),
            ("loc.measurement_noise_rtk_fixed", self.loc.measurement_noise_rtk_fixed),
            ("loc.measurement_noise_rtk_float", self.loc.measurement_noise_rtk_float),
            ("loc.measurement_noise_gps", self.loc.measurement_noise_gps),
            ("traj_ctrl.output_limit", self.traj_ctrl.output_limit),
            ("traj_ctrl.nominal_dt_s", self.traj_ctrl.nominal_dt_s),
            ("traj_ctrl.waypoint_reached_threshold_m", self.traj_ctrl.waypoint_reached_threshold_m),
            ("traj_ctrl.heading_tolerance_deg", self.traj_ctrl.heading_tolerance_deg),
            ("traj_ctrl.rotation_speed_ms", self.traj_ctrl.rotation_speed_ms),
            ("safety.max_connection_loss_s", self.safety.max_connection_loss_s),
            ("safety.watchdog_check_period_s", self.safety.watchdog_check_period_s),
        ];

        for (name, value) in positive.iter() {
            if !(*value > 0.0) {
                return Err(ParamsError::NotPositive(*name, *value));
            }
        }

        let non_negative = [
            ("traj_ctrl.k_p", self.traj_ctrl.k_p),
            ("traj_ctrl.k_i", self.traj_ctrl.k_i),
            ("traj_ctrl.k_d", self.traj_ctrl.k_d),
            ("traj_ctrl.drift_alert_threshold_m", self.traj_ctrl.drift_alert_threshold_m),
        ];

        for (name, value) in non_negative.iter() {
            if !(*value >= 0.0) {
                return Err(ParamsError::Negative(*name, *value));
            }
        }

        // A limit of 1 or more lets a wheel stop or reverse while line following
        if self.traj_ctrl.output_limit >= 1.0 {
            return Err(ParamsError::NotLessThan("traj_ctrl.output_limit", "1"));
        }

        if self.traj_ctrl.heading_tolerance_deg >= 180.0 {
            return Err(ParamsError::NotLessThan(
                "traj_ctrl.heading_tolerance_deg",
                "180",
            ));
        }

        if self.safety.watchdog_check_period_s >= self.safety.max_connection_loss_s {
            return Err(ParamsError::NotLessThan(
                "safety.watchdog_check_period_s",
                "safety.max_connection_loss_s",
            ));
        }

        if self.safety.max_hdop < 1.0 {
            return Err(ParamsError::InvalidMaxHdop(self.safety.max_hdop));
        }

        let mut warnings = Vec::new();
        let v_max = self.hardware.max_velocity_ms();

        if self.traj_ctrl.rotation_speed_ms > v_max {
            warnings.push(format!(
                "Rotation speed {:.3} m/s exceeds the maximum wheel velocity {:.3} m/s",
                self.traj_ctrl.rotation_speed_ms, v_max
            ));
        }

        if self.safety.require_rtk && self.safety.min_rtk_quality.is_some() {
            warnings.push(
                "safety.require_rtk is ignored when safety.min_rtk_quality is given".into(),
            );
        }

        if !self.safety.rtk_loss_stop_enabled && !self.safety.pause_on_degraded_fix {
            warnings.push("The rover will keep driving on a degraded position fix".into());
        }

        Ok(warnings)
    }
}
